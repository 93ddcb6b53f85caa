//! Error handling.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

use crate::buffer::ImageAxis;

/// Hyperstack error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum HyperstackError {
    /// Array rank cannot be normalized to the canonical axes, or an axis is empty
    #[error("cannot normalize array of shape {shape:?}: expected rank 2 to 5 with no empty axes")]
    Shape { shape: Vec<usize> },

    /// Slice coordinate out of bounds
    #[error("index {index} out of range for axis {axis} of size {size}")]
    IndexOutOfRange {
        axis: ImageAxis,
        index: isize,
        size: usize,
    },

    /// Requested number of reduction components is not in 1..=channels
    #[error("invalid component count {requested}, expected 1 to {channels}")]
    InvalidComponentCount { requested: usize, channels: usize },

    /// Statistics requested on a buffer with no elements
    #[error("cannot compute statistics of an empty buffer")]
    EmptyBuffer,

    /// Data contains values without a defined order (NaN)
    #[error("data contains values without a defined order")]
    UndefinedOrder,

    /// Requested number of clusters is not in 1..=pixels
    #[error("invalid cluster count {requested}, expected 1 to {pixels}")]
    InvalidClusterCount { requested: usize, pixels: usize },

    /// Unrecognised segmentation method
    #[error("unknown segmentation method {method}")]
    UnknownMethod { method: String },

    /// Error creating ndarray array from shape
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// Uploaded data is not a TIFF file
    #[error("invalid TIFF file: {reason}")]
    InvalidTiff { reason: &'static str },

    /// Error decoding TIFF data
    #[error("failed to decode TIFF data")]
    TiffDecode(#[from] tiff::TiffError),

    /// TIFF pages with a layout or sample format that cannot be loaded
    #[error("unsupported TIFF sample format {format}")]
    UnsupportedSampleFormat { format: String },

    /// No image stored under the requested identifier
    #[error("image {image_id} not found")]
    ImageNotFound { image_id: String },

    /// Error deserialising request data
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Error deserialising request query
    #[error("request query is not valid")]
    RequestQueryRejection(#[from] QueryRejection),

    /// Error validating request data
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error encoding a slice as PNG
    #[error("failed to encode PNG image")]
    PngEncode(#[from] image::ImageError),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Background task failed to complete
    #[error("background task failed")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl From<MinMaxError> for HyperstackError {
    fn from(error: MinMaxError) -> Self {
        match error {
            MinMaxError::EmptyInput => Self::EmptyBuffer,
            MinMaxError::UndefinedOrder => Self::UndefinedOrder,
        }
    }
}

impl IntoResponse for HyperstackError {
    /// Convert from a `HyperstackError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }

    /// Return a 400 bad request ErrorResponse
    fn bad_request<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Return a 404 not found ErrorResponse
    fn not_found<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// Return a 500 internal server error ErrorResponse
    fn internal_server_error<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<HyperstackError> for ErrorResponse {
    /// Convert from a `HyperstackError` into an `ErrorResponse`.
    fn from(error: HyperstackError) -> Self {
        let response = match &error {
            // Bad request
            HyperstackError::Shape { shape: _ }
            | HyperstackError::IndexOutOfRange {
                axis: _,
                index: _,
                size: _,
            }
            | HyperstackError::InvalidComponentCount {
                requested: _,
                channels: _,
            }
            | HyperstackError::EmptyBuffer
            | HyperstackError::UndefinedOrder
            | HyperstackError::InvalidClusterCount {
                requested: _,
                pixels: _,
            }
            | HyperstackError::UnknownMethod { method: _ }
            | HyperstackError::InvalidTiff { reason: _ }
            | HyperstackError::TiffDecode(_)
            | HyperstackError::UnsupportedSampleFormat { format: _ }
            | HyperstackError::RequestDataJsonRejection(_)
            | HyperstackError::RequestQueryRejection(_)
            | HyperstackError::RequestDataValidation(_) => Self::bad_request(&error),

            // Not found
            HyperstackError::ImageNotFound { image_id: _ } => Self::not_found(&error),

            // Internal server error
            HyperstackError::ShapeInvalid(_)
            | HyperstackError::PngEncode(_)
            | HyperstackError::SemaphoreAcquireError(_)
            | HyperstackError::TaskJoin(_)
            | HyperstackError::TryFromInt(_) => Self::internal_server_error(&error),
        };

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
