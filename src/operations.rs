//! Image operations.
//!
//! Each operation is implemented as a struct that implements the
//! [NumOperation](crate::operation::NumOperation) trait, and through it the
//! [Operation](crate::operation::Operation) trait used by the request handlers.

use crate::buffer::ImageBuffer;
use crate::error::HyperstackError;
use crate::metadata;
use crate::models::{ImageMetadata, StatisticsReport};
use crate::operation::{Element, NumOperation};
use crate::reduction::{self, ReductionResult};
use crate::segmentation::{self, Label, SegmentationParams};
use crate::slice;
use crate::statistics;

use ndarray::{Array2, Array3};

/// Describe the shape and element type of an image.
pub struct Metadata {}

impl NumOperation for Metadata {
    type Output = ImageMetadata;

    fn execute_t<T: Element>(
        &self,
        buffer: &ImageBuffer<T>,
    ) -> Result<Self::Output, HyperstackError> {
        Ok(metadata::extract(buffer))
    }
}

/// Extract a plane as an 8-bit raster.
///
/// Samples are saturated into [0, 255].
pub struct Slice {
    pub z: isize,
    pub t: isize,
    pub c: isize,
}

impl NumOperation for Slice {
    type Output = Array2<u8>;

    fn execute_t<T: Element>(
        &self,
        buffer: &ImageBuffer<T>,
    ) -> Result<Self::Output, HyperstackError> {
        let plane = slice::slice(buffer, self.z, self.t, self.c)?;
        Ok(plane.mapv(|x| x.as_f64().clamp(0.0, 255.0) as u8))
    }
}

/// Reduce the channel axis to its principal components.
pub struct Reduce {
    pub components: usize,
}

impl NumOperation for Reduce {
    type Output = ReductionResult;

    fn execute_t<T: Element>(
        &self,
        buffer: &ImageBuffer<T>,
    ) -> Result<Self::Output, HyperstackError> {
        reduction::reduce(buffer, self.components)
    }
}

/// Compute global and per-channel statistics.
pub struct Statistics {}

impl NumOperation for Statistics {
    type Output = StatisticsReport;

    fn execute_t<T: Element>(
        &self,
        buffer: &ImageBuffer<T>,
    ) -> Result<Self::Output, HyperstackError> {
        statistics::aggregate(buffer)
    }
}

/// Segment the (Z, H, W) volume at a time point and channel.
pub struct Segment {
    pub t: isize,
    pub c: isize,
    /// Method name, parsed by [segmentation::segment_volume]
    pub method: String,
    pub params: SegmentationParams,
}

impl NumOperation for Segment {
    type Output = Array3<Label>;

    fn execute_t<T: Element>(
        &self,
        buffer: &ImageBuffer<T>,
    ) -> Result<Self::Output, HyperstackError> {
        let volume = slice::volume(buffer, self.t, self.c)?;
        segmentation::segment_volume(volume, &self.method, &self.params)
    }
}
