//! Canonical image buffers.
//!
//! Every image is stored as a rank-5 (Z, T, C, H, W) [ndarray::Array5]. A [Rank] tag records
//! whether the image is logically 4D (T, C, H, W), in which case the Z axis has size 1 and is
//! never addressed, or 5D.

use crate::error::HyperstackError;
use crate::models::DType;
use crate::operation::Element;

use ndarray::{Array5, ArrayView5, Axis};
use serde::Serialize;
use strum_macros::Display;

/// Position of the Z (depth) axis in the canonical buffer.
pub const Z_AXIS: Axis = Axis(0);
/// Position of the T (time) axis in the canonical buffer.
pub const T_AXIS: Axis = Axis(1);
/// Position of the C (channel) axis in the canonical buffer.
pub const C_AXIS: Axis = Axis(2);
/// Position of the H (height) axis in the canonical buffer.
pub const H_AXIS: Axis = Axis(3);
/// Position of the W (width) axis in the canonical buffer.
pub const W_AXIS: Axis = Axis(4);

/// Number of axes of the canonical buffer.
pub const CANONICAL_RANK: usize = 5;

/// Logical rank of an image.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
pub enum Rank {
    /// (T, C, H, W)
    Rank4,
    /// (Z, T, C, H, W)
    Rank5,
}

/// Named image axes, used when reporting addressing errors.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum ImageAxis {
    Z,
    Time,
    Channel,
}

/// An owned, immutable image buffer in canonical (Z, T, C, H, W) order.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuffer<T> {
    data: Array5<T>,
    rank: Rank,
}

impl<T: Element> ImageBuffer<T> {
    /// Wrap a canonical array.
    ///
    /// Fails if any axis is empty, or if a 4D image has more than one Z plane.
    pub(crate) fn new(data: Array5<T>, rank: Rank) -> Result<Self, HyperstackError> {
        let empty_axis = data.shape().iter().any(|size| *size == 0);
        if empty_axis || (rank == Rank::Rank4 && data.len_of(Z_AXIS) != 1) {
            return Err(HyperstackError::Shape {
                shape: data.shape().to_vec(),
            });
        }
        Ok(ImageBuffer { data, rank })
    }

    /// Returns a read-only view of the canonical rank-5 array.
    pub fn view(&self) -> ArrayView5<'_, T> {
        self.data.view()
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Size of the Z axis (1 for 4D images).
    pub fn z(&self) -> usize {
        self.data.len_of(Z_AXIS)
    }

    /// Size of the T axis.
    pub fn t(&self) -> usize {
        self.data.len_of(T_AXIS)
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.data.len_of(C_AXIS)
    }

    pub fn height(&self) -> usize {
        self.data.len_of(H_AXIS)
    }

    pub fn width(&self) -> usize {
        self.data.len_of(W_AXIS)
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Returns the logical shape: four axes for 4D images, five for 5D images.
    pub fn shape(&self) -> Vec<usize> {
        match self.rank {
            Rank::Rank4 => self.data.shape()[1..].to_vec(),
            Rank::Rank5 => self.data.shape().to_vec(),
        }
    }
}

/// An image buffer of any supported element type.
///
/// The element type of a decoded file is only known at runtime. Operations are dispatched to
/// the generic implementations by [crate::operation::Operation].
#[derive(Clone, Debug, PartialEq)]
pub enum AnyImageBuffer {
    Uint8(ImageBuffer<u8>),
    Uint16(ImageBuffer<u16>),
    Uint32(ImageBuffer<u32>),
    Uint64(ImageBuffer<u64>),
    Int8(ImageBuffer<i8>),
    Int16(ImageBuffer<i16>),
    Int32(ImageBuffer<i32>),
    Int64(ImageBuffer<i64>),
    Float32(ImageBuffer<f32>),
    Float64(ImageBuffer<f64>),
}

impl AnyImageBuffer {
    /// Returns the element type of the buffer.
    pub fn dtype(&self) -> DType {
        match self {
            Self::Uint8(_) => DType::Uint8,
            Self::Uint16(_) => DType::Uint16,
            Self::Uint32(_) => DType::Uint32,
            Self::Uint64(_) => DType::Uint64,
            Self::Int8(_) => DType::Int8,
            Self::Int16(_) => DType::Int16,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }

    /// Returns the size of the buffer's data in bytes.
    pub fn size_in_bytes(&self) -> usize {
        let len = match self {
            Self::Uint8(buffer) => buffer.num_elements(),
            Self::Uint16(buffer) => buffer.num_elements(),
            Self::Uint32(buffer) => buffer.num_elements(),
            Self::Uint64(buffer) => buffer.num_elements(),
            Self::Int8(buffer) => buffer.num_elements(),
            Self::Int16(buffer) => buffer.num_elements(),
            Self::Int32(buffer) => buffer.num_elements(),
            Self::Int64(buffer) => buffer.num_elements(),
            Self::Float32(buffer) => buffer.num_elements(),
            Self::Float64(buffer) => buffer.num_elements(),
        };
        len * self.dtype().size_of()
    }
}

impl From<ImageBuffer<u8>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<u8>) -> Self {
        Self::Uint8(buffer)
    }
}

impl From<ImageBuffer<u16>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<u16>) -> Self {
        Self::Uint16(buffer)
    }
}

impl From<ImageBuffer<u32>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<u32>) -> Self {
        Self::Uint32(buffer)
    }
}

impl From<ImageBuffer<u64>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<u64>) -> Self {
        Self::Uint64(buffer)
    }
}

impl From<ImageBuffer<i8>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<i8>) -> Self {
        Self::Int8(buffer)
    }
}

impl From<ImageBuffer<i16>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<i16>) -> Self {
        Self::Int16(buffer)
    }
}

impl From<ImageBuffer<i32>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<i32>) -> Self {
        Self::Int32(buffer)
    }
}

impl From<ImageBuffer<i64>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<i64>) -> Self {
        Self::Int64(buffer)
    }
}

impl From<ImageBuffer<f32>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<f32>) -> Self {
        Self::Float32(buffer)
    }
}

impl From<ImageBuffer<f64>> for AnyImageBuffer {
    fn from(buffer: ImageBuffer<f64>) -> Self {
        Self::Float64(buffer)
    }
}
