//! HTTP routes

pub mod health;
pub mod index;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Build the application router
pub fn app(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index::index))
        .route("/health", get(health::health_check))
        .route("/predict", post(predict::predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use tomato_leaf::backend::default_device;
    use tomato_leaf::inference::Predictor;
    use tomato_leaf::knowledge::DiseaseCatalog;
    use tomato_leaf::model::{
        default_registry, ClassifierConfig, LayerSpec, ModelArtifact, TomatoClassifier, WeightBlob,
    };

    use crate::state::{AppState, ServerConfig};

    const BOUNDARY: &str = "tomato-leaf-test-boundary";

    fn tiny_predictor() -> Predictor<crate::state::ServerBackend> {
        let kernel: Vec<f32> = (0..60).map(|i| ((i % 5) as f32 - 2.0) * 0.1).collect();
        let artifact = ModelArtifact::new("tiny", [128, 128, 3])
            .with_layer(
                LayerSpec::new("DualECALayer", "dual_eca")
                    .with_config(json!({ "k_size": 5 }))
                    .with_weight(
                        "conv1d_sigmoid",
                        WeightBlob::new(vec![5, 1, 1], vec![0.1, 0.2, 0.4, 0.2, 0.1]),
                    )
                    .with_weight(
                        "conv1d_tanh",
                        WeightBlob::new(vec![5, 1, 1], vec![-0.2, 0.0, 0.9, 0.0, 0.2]),
                    ),
            )
            .with_layer(LayerSpec::new("GlobalAveragePooling2D", "gap"))
            .with_layer(
                LayerSpec::new("Dense", "predictions")
                    .with_config(json!({ "units": 10, "activation": "softmax" }))
                    .with_weight("kernel", WeightBlob::new(vec![6, 10], kernel))
                    .with_weight("bias", WeightBlob::new(vec![10], vec![0.0; 10])),
            );

        let classifier = TomatoClassifier::from_artifact(
            &artifact,
            &default_registry(),
            ClassifierConfig::default(),
            &default_device(),
        )
        .unwrap();
        Predictor::new(classifier, DiseaseCatalog::builtin())
    }

    fn loaded_app() -> Router {
        app(Arc::new(AppState::new(
            ServerConfig::default(),
            Some(tiny_predictor()),
        )))
    }

    fn unloaded_app() -> Router {
        app(Arc::new(AppState::new(ServerConfig::default(), None)))
    }

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_fn(300, 200, |x, y| Rgb([(x % 256) as u8, 140, (y % 256) as u8]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart_request(field: &str, payload: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"leaf.png\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_predict_returns_disease_and_guidance() {
        let (status, body) = send(loaded_app(), multipart_request("file", &png_bytes())).await;

        assert_eq!(status, StatusCode::OK);
        let disease = body["disease"].as_str().unwrap();
        assert!(!disease.contains('_'));
        let confidence = body["confidence"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&confidence));
        assert!(body["cause"].as_str().is_some());
        assert_eq!(body["recommendations"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let (status, body) = send(loaded_app(), multipart_request("image", &png_bytes())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(loaded_app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_unparsable_image_is_server_error() {
        let (status, body) = send(loaded_app(), multipart_request("file", b"not an image")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("decode"));
    }

    #[tokio::test]
    async fn test_model_not_loaded() {
        let (status, body) = send(unloaded_app(), multipart_request("file", &png_bytes())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Model not loaded");
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(loaded_app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_loaded"], true);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (_, body) = send(unloaded_app(), request).await;
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_index_serves_upload_form() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = unloaded_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<form"));
        assert!(html.contains("/predict"));
    }
}
