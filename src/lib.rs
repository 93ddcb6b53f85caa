//! This crate provides Hyperstack, an engine and HTTP service for multi-page scientific image
//! stacks. Images with up to five logical axes (Z depth, Time, Channel, Height and Width) are
//! decoded from TIFF files into a canonical in-memory buffer, on which the following operations
//! are provided:
//!
//! * metadata extraction
//! * extraction of single (H, W) planes
//! * channel-wise principal component analysis
//! * global and per-channel statistics
//! * per-plane segmentation by Otsu thresholding or k-means clustering
//!
//! The array engine ([normalize], [metadata], [slice], [reduction], [statistics] and
//! [segmentation]) is made of pure functions over an explicitly passed, immutable
//! [buffer::ImageBuffer]. The HTTP layer ([app]) decodes uploads, caches the buffers by
//! identifier and runs the operations outside the async runtime.
//!
//! Hyperstack is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used in numerical
//!   computation, and [Rayon](rayon) parallelises work across channels and planes.
//! * [nalgebra] solves the symmetric eigenproblems of the principal component analysis.
//! * [tiff] decodes the uploaded image files and [image] encodes slices as PNG.

pub mod app;
pub mod app_state;
pub mod buffer;
pub mod cli;
pub mod error;
pub mod image_store;
pub mod loader;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod operation;
pub mod operations;
pub mod reduction;
pub mod resource_manager;
pub mod segmentation;
pub mod server;
pub mod slice;
pub mod statistics;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod validated_json;
