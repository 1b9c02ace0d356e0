use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use imgly_bgremove_server::{
    create_router, AppState, BackgroundRemovalProcessor, MockBackend, ProcessorConfig,
};
use std::sync::atomic::Ordering;
use tower::ServiceExt;

const BOUNDARY: &str = "bgremove-test-boundary";
const LIMIT: usize = 8 * 1024 * 1024;

enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                name,
                filename,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            },
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            },
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/remove-background")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("build request")
}

fn app_with(backend: MockBackend, limit: usize) -> Router {
    let processor =
        BackgroundRemovalProcessor::with_backend(ProcessorConfig::default(), Box::new(backend))
            .expect("processor");
    create_router(AppState::new(processor), limit)
}

fn app() -> Router {
    app_with(MockBackend::with_size(64), LIMIT)
}

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut buffer), format)
        .expect("encode image");
    buffer
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

async fn error_message(response: axum::response::Response) -> String {
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).expect("json body");
    body["error"].as_str().expect("error field").to_string()
}

#[tokio::test]
async fn health_always_reports_ok() {
    let app = app();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("call app");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, br#"{"status":"ok"}"#);
    }
}

#[tokio::test]
async fn png_upload_returns_transparent_png() {
    let png = encoded(48, 32, ImageFormat::Png);
    let response = app()
        .oneshot(upload_request(&[Part::File {
            name: "image",
            filename: "input.png",
            data: &png,
        }]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).expect("content type"),
        "image/png"
    );

    let body = body_bytes(response).await;
    assert_eq!(image::guess_format(&body).expect("format"), ImageFormat::Png);
    let output = image::load_from_memory(&body).expect("decode output");
    assert_eq!(output.dimensions(), (48, 32));

    let rgba = output.to_rgba8();
    assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(rgba.get_pixel(24, 16).0[3], 255);
}

#[tokio::test]
async fn jpeg_upload_is_accepted() {
    let jpeg = encoded(20, 40, ImageFormat::Jpeg);
    let response = app()
        .oneshot(upload_request(&[
            Part::Text {
                name: "note",
                value: "ignored",
            },
            Part::File {
                name: "image",
                filename: "photo.jpg",
                data: &jpeg,
            },
        ]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::OK);
    let output = image::load_from_memory(&body_bytes(response).await).expect("decode output");
    assert_eq!(output.dimensions(), (20, 40));
}

#[tokio::test]
async fn missing_image_field_is_rejected() {
    let png = encoded(8, 8, ImageFormat::Png);
    let response = app()
        .oneshot(upload_request(&[Part::File {
            name: "file",
            filename: "input.png",
            data: &png,
        }]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "No image file provided");
}

#[tokio::test]
async fn image_text_field_counts_as_missing() {
    let response = app()
        .oneshot(upload_request(&[Part::Text {
            name: "image",
            value: "not a file",
        }]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "No image file provided");
}

#[tokio::test]
async fn non_multipart_request_counts_as_missing() {
    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/remove-background")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"image":"x"}"#))
                .expect("build request"),
        )
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "No image file provided");
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let response = app()
        .oneshot(upload_request(&[Part::File {
            name: "image",
            filename: "",
            data: b"",
        }]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "No file selected");
}

#[tokio::test]
async fn corrupt_image_is_server_error() {
    let response = app()
        .oneshot(upload_request(&[Part::File {
            name: "image",
            filename: "broken.png",
            data: b"\x89PNG\r\n\x1a\nthis is not really a png",
        }]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let message = error_message(response).await;
    assert!(
        message.contains("Failed to decode image from bytes"),
        "unexpected message: {message}"
    );
}

#[tokio::test]
async fn truncated_multipart_is_server_error() {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"image\"; filename=\"input.png\"\r\n\
         Content-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&encoded(8, 8, ImageFormat::Png));

    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/remove-background")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .expect("build request"),
        )
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!error_message(response).await.is_empty());
}

#[tokio::test]
async fn inference_failure_is_server_error() {
    let png = encoded(16, 16, ImageFormat::Png);
    let response = app_with(MockBackend::failing_inference(), LIMIT)
        .oneshot(upload_request(&[Part::File {
            name: "image",
            filename: "input.png",
            data: &png,
        }]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(response).await,
        "Inference error: Mock backend inference failed"
    );
}

#[tokio::test]
async fn repeated_requests_succeed_independently() {
    let backend = MockBackend::with_size(64);
    let counter = backend.infer_counter();
    let app = app_with(backend, LIMIT);
    let png = encoded(30, 30, ImageFormat::Png);

    let mut outputs = Vec::new();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(upload_request(&[Part::File {
                name: "image",
                filename: "input.png",
                data: &png,
            }]))
            .await
            .expect("call app");
        assert_eq!(response.status(), StatusCode::OK);
        outputs.push(body_bytes(response).await);
    }

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let payload = vec![0u8; 4096];
    let response = app_with(MockBackend::with_size(64), 256)
        .oneshot(upload_request(&[Part::File {
            name: "image",
            filename: "input.png",
            data: &payload,
        }]))
        .await
        .expect("call app");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/remove-background")
                .header(header::ORIGIN, "https://example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("call app");

    assert!(response.status().is_success());
    let allow_origin = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .expect("missing allow origin")
        .to_str()
        .expect("invalid allow origin");
    assert_eq!(allow_origin, "*");
}

#[tokio::test]
async fn cors_headers_on_simple_requests() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header(header::ORIGIN, "https://example.com")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("call app");

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .expect("missing allow origin"),
        "*"
    );
}
