//! Data types and associated functions and methods

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use validator::{Validate, ValidationError};

use crate::segmentation::{Label, SegmentationMethod};

/// Supported numerical data types
///
/// Names follow NumPy's dtype names, which is what clients of the service expect to see.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    /// [u8]
    Uint8,
    /// [u16]
    Uint16,
    /// [u32]
    Uint32,
    /// [u64]
    Uint64,
    /// [i8]
    Int8,
    /// [i16]
    Int16,
    /// [i32]
    Int32,
    /// [i64]
    Int64,
    /// [f32]
    Float32,
    /// [f64]
    Float64,
}

impl DType {
    /// Returns the size of the associated type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Uint8 => std::mem::size_of::<u8>(),
            Self::Uint16 => std::mem::size_of::<u16>(),
            Self::Uint32 => std::mem::size_of::<u32>(),
            Self::Uint64 => std::mem::size_of::<u64>(),
            Self::Int8 => std::mem::size_of::<i8>(),
            Self::Int16 => std::mem::size_of::<i16>(),
            Self::Int32 => std::mem::size_of::<i32>(),
            Self::Int64 => std::mem::size_of::<i64>(),
            Self::Float32 => std::mem::size_of::<f32>(),
            Self::Float64 => std::mem::size_of::<f64>(),
        }
    }
}

/// Descriptive record of a canonical image buffer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ImageMetadata {
    /// Element type
    pub dtype: DType,
    /// Logical shape: (T, C, H, W) for 4D images, (Z, T, C, H, W) for 5D images
    pub shape: Vec<usize>,
    #[serde(rename = "Z")]
    pub z: usize,
    #[serde(rename = "T")]
    pub t: usize,
    #[serde(rename = "Channels")]
    pub channels: usize,
    #[serde(rename = "Height")]
    pub height: usize,
    #[serde(rename = "Width")]
    pub width: usize,
}

/// Summary statistics of a set of samples.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

/// Summary statistics of a single channel.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChannelSummary {
    /// Channel index
    pub channel: usize,
    #[serde(flatten)]
    pub summary: Summary,
}

/// Global and per-channel statistics of an image.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub global: Summary,
    /// Per-channel statistics in ascending channel order
    #[serde(rename = "perChannel")]
    pub per_channel: Vec<ChannelSummary>,
}

fn default_components() -> usize {
    3
}

fn default_method() -> String {
    SegmentationMethod::Otsu.to_string()
}

fn default_n_clusters() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

/// Query identifying a stored image
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct ImageQuery {
    /// Identifier returned by the upload endpoint
    #[validate(length(min = 1, message = "image_id must not be empty"))]
    pub image_id: String,
}

/// Query selecting a single plane of a stored image
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct SliceQuery {
    #[validate(length(min = 1, message = "image_id must not be empty"))]
    pub image_id: String,
    /// Depth index, ignored for 4D images
    #[serde(default)]
    pub z: isize,
    /// Time index
    #[serde(default)]
    pub time: isize,
    /// Channel index
    #[serde(default)]
    pub channel: isize,
}

/// Request data for the channel reduction
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, message = "image_id must not be empty"))]
    pub image_id: String,
    /// Number of components to retain
    #[serde(default = "default_components")]
    #[validate(range(min = 1, message = "components must be greater than 0"))]
    pub components: usize,
}

/// Request data for segmentation of the (Z, H, W) volume at a time point and channel
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct SegmentRequest {
    #[validate(length(min = 1, message = "image_id must not be empty"))]
    pub image_id: String,
    #[serde(default)]
    pub time: isize,
    #[serde(default)]
    pub channel: isize,
    /// Segmentation method name
    #[serde(default = "default_method")]
    #[validate(custom = "validate_method")]
    pub method: String,
    /// Number of clusters for k-means
    #[serde(default = "default_n_clusters")]
    #[validate(range(min = 1, max = 16, message = "n_clusters must be between 1 and 16"))]
    pub n_clusters: usize,
    /// Seed for k-means initialisation
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Validate a segmentation method name
fn validate_method(method: &str) -> Result<(), ValidationError> {
    if method.parse::<SegmentationMethod>().is_err() {
        let mut error = ValidationError::new("method must be one of otsu or kmeans");
        error.add_param("method".into(), &method);
        return Err(error);
    }
    Ok(())
}

/// Response to a successful upload
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub image_id: String,
}

/// Response containing the result of a channel reduction
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct AnalyzeResponse {
    pub image_id: String,
    pub n_components: usize,
    /// Shape of `pca_result`
    pub shape: Vec<usize>,
    pub explained_variance_ratio: Vec<f64>,
    /// Projected data, flattened in row-major order
    pub pca_result: Vec<f64>,
}

/// Response containing a segmentation mask and its summary
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct SegmentResponse {
    pub image_id: String,
    pub method: SegmentationMethod,
    /// Shape of `labels`
    pub shape: Vec<usize>,
    /// Fraction of pixels with a non-zero label
    pub foreground_fraction: f64,
    /// Number of pixels carrying each label
    pub label_counts: BTreeMap<Label, usize>,
    /// Labels, flattened in row-major order
    pub labels: Vec<Label>,
}
