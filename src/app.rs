//! Hyperstack HTTP API
//!
//! Images are uploaded as TIFF files, decoded once into canonical buffers and held in the
//! [ImageStore](crate::image_store::ImageStore). Every other endpoint addresses an image by the
//! identifier returned from the upload.

use crate::app_state::{AppState, SharedAppState};
use crate::cli::CommandLineArgs;
use crate::error::HyperstackError;
use crate::loader;
use crate::metrics::{metrics_handler, record_response_metrics, request_counter};
use crate::models;
use crate::operation::Operation;
use crate::operations;
use crate::segmentation::{self, SegmentationMethod, SegmentationParams};
use crate::validated_json::{ValidatedJson, ValidatedQuery};

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use image::{
    error::{ParameterError, ParameterErrorKind},
    GrayImage, ImageError, ImageFormat,
};
use ndarray::Array2;
use tower::Layer;
use tower::ServiceBuilder;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;

/// `x-hyperstack-shape` header, carrying the shape of a returned slice as JSON
static HEADER_SHAPE: header::HeaderName = header::HeaderName::from_static("x-hyperstack-shape");

/// Service type returned by [service].
pub type Service = tower_http::normalize_path::NormalizePath<Router>;

/// Returns a [axum::Router] for the Hyperstack API
///
/// The router is populated with all routes as well as the following middleware:
///
/// * a [tower_http::trace::TraceLayer] for tracing requests and responses, which also updates
///   the request and response metrics
/// * a [axum::extract::DefaultBodyLimit] sized for image uploads
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn router(args: &CommandLineArgs) -> Router {
    let state = Arc::new(AppState::new(args));

    fn v1(state: SharedAppState) -> Router {
        let body_limit = state.args.max_upload_bytes;
        Router::new()
            .route("/upload", post(upload))
            .route("/metadata", get(metadata))
            .route("/slice", get(slice))
            .route("/analyze", post(analyze))
            .route("/statistics", get(statistics))
            .route("/segment", post(segment))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(
                ServiceBuilder::new().layer(
                    TraceLayer::new_for_http()
                        .on_request(request_counter)
                        .on_response(record_response_metrics),
                ),
            )
            .with_state(state)
    }

    Router::new()
        .route("/metrics", get(metrics_handler))
        .nest("/v1", v1(state))
}

/// Returns a [crate::app::Service] for the Hyperstack API
///
/// The service is populated with all routes as well as the following middleware:
///
/// * a [tower_http::normalize_path::NormalizePathLayer] for trimming trailing slashes from
///   requests
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn service(args: &CommandLineArgs) -> Service {
    let router = router(args);

    // Note that any middleware that should affect routing must wrap the router.
    // See
    // https://docs.rs/axum/0.6.12/axum/middleware/index.html#rewriting-request-uri-in-middleware.
    NormalizePathLayer::trim_trailing_slash().layer(router)
}

/// Run a CPU-bound task off the async runtime.
///
/// A task permit is held for the duration of the task. The task runs in the Rayon thread pool
/// if `use_rayon` is set, otherwise in Tokio's blocking thread pool.
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `task`: The task to run
async fn run_task<F, R>(state: &AppState, task: F) -> Result<R, HyperstackError>
where
    F: FnOnce() -> Result<R, HyperstackError> + Send + 'static,
    R: Send + 'static,
{
    let _task_permit = state.resource_manager.task().await?;
    if state.args.use_rayon {
        tokio_rayon::spawn(task).await
    } else {
        tokio::task::spawn_blocking(task).await?
    }
}

/// Encode an 8-bit raster as a grayscale PNG image.
fn encode_png(raster: Array2<u8>) -> Result<Vec<u8>, HyperstackError> {
    let (height, width) = raster.dim();
    let pixels = raster.iter().copied().collect();
    let image = GrayImage::from_raw(u32::try_from(width)?, u32::try_from(height)?, pixels)
        .ok_or_else(|| {
            ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            ))
        })?;
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}

/// Handler for image uploads
///
/// The request body is the raw TIFF file.
#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
async fn upload(
    State(state): State<SharedAppState>,
    body: Bytes,
) -> Result<Json<models::UploadResponse>, HyperstackError> {
    loader::validate_tiff(&body)?;
    let max_decoded_bytes = state.args.max_decoded_bytes;
    let buffer = run_task(&state, move || loader::load_tiff(&body, max_decoded_bytes)).await?;
    tracing::debug!(
        "Decoded {} image of {} bytes",
        buffer.dtype(),
        buffer.size_in_bytes()
    );
    let image_id = state.images.insert(buffer).await;
    Ok(Json(models::UploadResponse {
        message: "File uploaded successfully".to_string(),
        image_id,
    }))
}

/// Handler for image metadata requests
#[tracing::instrument(skip(state))]
async fn metadata(
    State(state): State<SharedAppState>,
    ValidatedQuery(query): ValidatedQuery<models::ImageQuery>,
) -> Result<Json<models::ImageMetadata>, HyperstackError> {
    let buffer = state.images.get(&query.image_id).await?;
    Ok(Json(operations::Metadata {}.execute(&buffer)?))
}

/// Handler for slice requests
///
/// Returns the plane as a PNG image.
#[tracing::instrument(skip(state))]
async fn slice(
    State(state): State<SharedAppState>,
    ValidatedQuery(query): ValidatedQuery<models::SliceQuery>,
) -> Result<Response, HyperstackError> {
    let buffer = state.images.get(&query.image_id).await?;
    let operation = operations::Slice {
        z: query.z,
        t: query.time,
        c: query.channel,
    };
    let (png, shape) = run_task(&state, move || {
        let raster = operation.execute(&buffer)?;
        let shape = raster.shape().to_vec();
        Ok((encode_png(raster)?, shape))
    })
    .await?;
    let shape = serde_json::to_string(&shape).unwrap_or_default();
    Ok((
        [
            (&header::CONTENT_TYPE, mime::IMAGE_PNG.to_string()),
            (&HEADER_SHAPE, shape),
        ],
        png,
    )
        .into_response())
}

/// Handler for channel reduction requests
#[tracing::instrument(skip(state))]
async fn analyze(
    State(state): State<SharedAppState>,
    ValidatedJson(request): ValidatedJson<models::AnalyzeRequest>,
) -> Result<Json<models::AnalyzeResponse>, HyperstackError> {
    let buffer = state.images.get(&request.image_id).await?;
    let operation = operations::Reduce {
        components: request.components,
    };
    let result = run_task(&state, move || operation.execute(&buffer)).await?;
    Ok(Json(models::AnalyzeResponse {
        image_id: request.image_id,
        n_components: result.n_components(),
        shape: result.projected.shape().to_vec(),
        explained_variance_ratio: result.explained_variance_ratio,
        pca_result: result.projected.iter().copied().collect(),
    }))
}

/// Handler for statistics requests
#[tracing::instrument(skip(state))]
async fn statistics(
    State(state): State<SharedAppState>,
    ValidatedQuery(query): ValidatedQuery<models::ImageQuery>,
) -> Result<Json<models::StatisticsReport>, HyperstackError> {
    let buffer = state.images.get(&query.image_id).await?;
    let report = run_task(&state, move || operations::Statistics {}.execute(&buffer)).await?;
    Ok(Json(report))
}

/// Handler for segmentation requests
#[tracing::instrument(skip(state))]
async fn segment(
    State(state): State<SharedAppState>,
    ValidatedJson(request): ValidatedJson<models::SegmentRequest>,
) -> Result<Json<models::SegmentResponse>, HyperstackError> {
    let method = request.method.parse::<SegmentationMethod>()?;
    let buffer = state.images.get(&request.image_id).await?;
    let operation = operations::Segment {
        t: request.time,
        c: request.channel,
        method: request.method,
        params: SegmentationParams {
            n_clusters: request.n_clusters,
            seed: request.seed,
        },
    };
    let labels = run_task(&state, move || operation.execute(&buffer)).await?;
    Ok(Json(models::SegmentResponse {
        image_id: request.image_id,
        method,
        shape: labels.shape().to_vec(),
        foreground_fraction: segmentation::foreground_fraction(labels.view()),
        label_counts: segmentation::label_counts(labels.view()),
        labels: labels.iter().copied().collect(),
    }))
}

#[cfg(test)]
mod tests {
    // https://github.com/tokio-rs/axum/blob/main/examples/testing/src/main.rs

    use super::*;

    use crate::test_utils;

    use axum::{
        body::Body,
        http::{self, Request, StatusCode},
    };
    use ndarray::s;
    use regex::Regex;
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot` and `ready`

    fn test_args(use_rayon: bool) -> CommandLineArgs {
        CommandLineArgs {
            host: "127.0.0.1".to_string(),
            port: 8080,
            graceful_shutdown_timeout: 1,
            use_rayon,
            thread_limit: Some(2),
            max_upload_bytes: 1 << 20,
            max_decoded_bytes: 1 << 20,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(http::Method::POST)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    // Jump through the hoops to get the body as bytes.
    async fn body_bytes(response: Response) -> Vec<u8> {
        hyper::body::to_bytes(response.into_body())
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    // Upload the test hyperstack and return its identifier.
    async fn upload_hyperstack(app: &Router) -> String {
        let bytes = test_utils::hyperstack_tiff(&test_utils::hyperstack_u16());
        let request = Request::builder()
            .method(http::Method::POST)
            .uri("/v1/upload")
            .header(http::header::CONTENT_TYPE, "image/tiff")
            .body(Body::from(bytes))
            .unwrap();
        let response = send(app, request).await;
        assert_eq!(StatusCode::OK, response.status());
        let body = body_json(response).await;
        assert_eq!("File uploaded successfully", body["message"]);
        body["image_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn upload_and_metadata() {
        let app = router(&test_args(false));
        let image_id = upload_hyperstack(&app).await;
        let response = send(&app, get_request(&format!("/v1/metadata?image_id={image_id}"))).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(
            json!({
                "dtype": "uint16",
                "shape": [2, 1, 3, 4, 4],
                "Z": 2,
                "T": 1,
                "Channels": 3,
                "Height": 4,
                "Width": 4
            }),
            body_json(response).await
        );
    }

    #[tokio::test]
    async fn upload_invalid_file() {
        let app = router(&test_args(false));
        let request = Request::builder()
            .method(http::Method::POST)
            .uri("/v1/upload")
            .body(Body::from("not a tiff"))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let re = Regex::new(r".*invalid TIFF file: missing TIFF header.*").unwrap();
        assert!(re.is_match(&body), "body: {body}");
    }

    #[tokio::test]
    async fn upload_too_large() {
        let mut args = test_args(false);
        args.max_upload_bytes = 16;
        let app = router(&args);
        let bytes = test_utils::hyperstack_tiff(&test_utils::hyperstack_u16());
        let request = Request::builder()
            .method(http::Method::POST)
            .uri("/v1/upload")
            .body(Body::from(bytes))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(StatusCode::PAYLOAD_TOO_LARGE, response.status());
    }

    #[tokio::test]
    async fn upload_decoded_too_large() {
        let mut args = test_args(false);
        args.max_decoded_bytes = 128;
        let app = router(&args);
        // 96 samples of 2 bytes each.
        let bytes = test_utils::hyperstack_tiff(&test_utils::hyperstack_u16());
        let request = Request::builder()
            .method(http::Method::POST)
            .uri("/v1/upload")
            .body(Body::from(bytes))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let body = body_json(response).await;
        assert_eq!(
            "invalid TIFF file: decoded image exceeds the size limit",
            body["error"]["message"]
        );
    }

    #[tokio::test]
    async fn metadata_not_found() {
        let app = router(&test_args(false));
        let response = send(&app, get_request("/v1/metadata?image_id=foo")).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());
        let body = body_json(response).await;
        assert_eq!("image foo not found", body["error"]["message"]);
    }

    #[tokio::test]
    async fn metadata_missing_image_id() {
        let app = router(&test_args(false));
        let response = send(&app, get_request("/v1/metadata")).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
    }

    #[tokio::test]
    async fn slice_png() {
        let app = router(&test_args(false));
        let image_id = upload_hyperstack(&app).await;
        let uri = format!("/v1/slice?image_id={image_id}&z=1&time=0&channel=2");
        let response = send(&app, get_request(&uri)).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(
            "image/png",
            response.headers()[&http::header::CONTENT_TYPE]
        );
        assert_eq!("[4,4]", response.headers()[&HEADER_SHAPE]);
        let png = body_bytes(response).await;
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_luma8();
        assert_eq!((4, 4), decoded.dimensions());
        let buffer = test_utils::hyperstack_u16();
        let expected: Vec<u8> = buffer
            .view()
            .slice(s![1, 0, 2, .., ..])
            .iter()
            .map(|x| *x as u8)
            .collect();
        assert_eq!(expected, decoded.into_raw());
    }

    #[tokio::test]
    async fn slice_out_of_range() {
        let app = router(&test_args(false));
        let image_id = upload_hyperstack(&app).await;
        let uri = format!("/v1/slice?image_id={image_id}&z=0&time=0&channel=3");
        let response = send(&app, get_request(&uri)).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let body = body_json(response).await;
        assert_eq!(
            "index 3 out of range for axis channel of size 3",
            body["error"]["message"]
        );
    }

    async fn analyze_hyperstack(use_rayon: bool) {
        let app = router(&test_args(use_rayon));
        let image_id = upload_hyperstack(&app).await;
        let request = json_request(
            "/v1/analyze",
            json!({"image_id": image_id, "components": 2}),
        );
        let response = send(&app, request).await;
        assert_eq!(StatusCode::OK, response.status());
        let body: models::AnalyzeResponse =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(image_id, body.image_id);
        assert_eq!(2, body.n_components);
        assert_eq!(vec![2, 1, 4, 4, 2], body.shape);
        assert_eq!(2, body.explained_variance_ratio.len());
        assert!(body.explained_variance_ratio.iter().sum::<f64>() <= 1.0 + 1e-12);
        assert_eq!(64, body.pca_result.len());
    }

    #[tokio::test]
    async fn analyze() {
        analyze_hyperstack(false).await
    }

    #[tokio::test]
    async fn analyze_rayon() {
        analyze_hyperstack(true).await
    }

    #[tokio::test]
    async fn analyze_too_many_components() {
        let app = router(&test_args(false));
        let image_id = upload_hyperstack(&app).await;
        let request = json_request("/v1/analyze", json!({"image_id": image_id}));
        let response = send(&app, request).await;
        // The default of 3 components is valid for 3 channels.
        assert_eq!(StatusCode::OK, response.status());
        let request = json_request(
            "/v1/analyze",
            json!({"image_id": image_id, "components": 4}),
        );
        let response = send(&app, request).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let body = body_json(response).await;
        assert_eq!(
            "invalid component count 4, expected 1 to 3",
            body["error"]["message"]
        );
    }

    #[tokio::test]
    async fn analyze_zero_components() {
        let app = router(&test_args(false));
        let request = json_request("/v1/analyze", json!({"image_id": "foo", "components": 0}));
        let response = send(&app, request).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let re = Regex::new(r".*components must be greater than 0.*").unwrap();
        assert!(re.is_match(&body), "body: {body}");
    }

    #[tokio::test]
    async fn statistics() {
        let app = router(&test_args(false));
        let image_id = upload_hyperstack(&app).await;
        let uri = format!("/v1/statistics?image_id={image_id}");
        let response = send(&app, get_request(&uri)).await;
        assert_eq!(StatusCode::OK, response.status());
        let body: models::StatisticsReport =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        let expected = crate::statistics::aggregate(&test_utils::hyperstack_u16()).unwrap();
        assert_eq!(expected, body);
    }

    #[tokio::test]
    async fn segment_otsu() {
        let app = router(&test_args(false));
        let image_id = upload_hyperstack(&app).await;
        let request = json_request(
            "/v1/segment",
            json!({"image_id": image_id, "channel": 1}),
        );
        let response = send(&app, request).await;
        assert_eq!(StatusCode::OK, response.status());
        let body: models::SegmentResponse =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(SegmentationMethod::Otsu, body.method);
        assert_eq!(vec![2, 4, 4], body.shape);
        assert_eq!(32, body.labels.len());
        assert_eq!(32, body.label_counts.values().sum::<usize>());
        let foreground = body.labels.iter().filter(|label| **label != 0).count();
        assert!((body.foreground_fraction - foreground as f64 / 32.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn segment_kmeans() {
        let app = router(&test_args(true));
        let image_id = upload_hyperstack(&app).await;
        let request = json_request(
            "/v1/segment",
            json!({"image_id": image_id, "method": "kmeans", "n_clusters": 3, "seed": 1}),
        );
        let response = send(&app, request).await;
        assert_eq!(StatusCode::OK, response.status());
        let body: models::SegmentResponse =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(SegmentationMethod::KMeans, body.method);
        assert!(body.labels.iter().all(|label| *label < 3));
    }

    #[tokio::test]
    async fn segment_unknown_method() {
        let app = router(&test_args(false));
        let request = json_request(
            "/v1/segment",
            json!({"image_id": "foo", "method": "watershed"}),
        );
        let response = send(&app, request).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let re = Regex::new(r".*method must be one of otsu or kmeans.*").unwrap();
        assert!(re.is_match(&body), "body: {body}");
    }

    #[tokio::test]
    async fn metrics() {
        let app = router(&test_args(false));
        let response = send(&app, get_request("/metrics")).await;
        assert_eq!(StatusCode::OK, response.status());
    }

    #[tokio::test]
    async fn service_trims_trailing_slash() {
        let app = service(&test_args(false));
        let response = app
            .oneshot(get_request("/v1/metadata/?image_id=foo"))
            .await
            .unwrap();
        assert_eq!(StatusCode::NOT_FOUND, response.status());
        let body = body_json(response).await;
        assert_eq!("image foo not found", body["error"]["message"]);
    }

    #[test]
    fn png_round_trip_dimensions() {
        let raster = Array2::from_shape_fn((3, 5), |(h, w)| (h * 5 + w) as u8);
        let png = encode_png(raster.clone()).unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_luma8();
        assert_eq!((5, 3), decoded.dimensions());
        assert_eq!(raster.iter().copied().collect::<Vec<_>>(), decoded.into_raw());
    }
}
