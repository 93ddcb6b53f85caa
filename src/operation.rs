use crate::buffer::{AnyImageBuffer, ImageBuffer};
use crate::error::HyperstackError;
use crate::models::DType;

use num_traits::ToPrimitive;

/// Trait for array elements.
pub trait Element:
    Clone + Copy + PartialOrd + Send + Sync + ToPrimitive + std::fmt::Debug + 'static
{
    /// Runtime data type corresponding to the element type.
    const DTYPE: DType;

    /// Widen to the floating point working type used by the numerical operations.
    fn as_f64(self) -> f64 {
        // Conversion of primitive numbers to f64 cannot fail.
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl Element for u8 {
    const DTYPE: DType = DType::Uint8;
}

impl Element for u16 {
    const DTYPE: DType = DType::Uint16;
}

impl Element for u32 {
    const DTYPE: DType = DType::Uint32;
}

impl Element for u64 {
    const DTYPE: DType = DType::Uint64;
}

impl Element for i8 {
    const DTYPE: DType = DType::Int8;
}

impl Element for i16 {
    const DTYPE: DType = DType::Int16;
}

impl Element for i32 {
    const DTYPE: DType = DType::Int32;
}

impl Element for i64 {
    const DTYPE: DType = DType::Int64;
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;
}

impl Element for f64 {
    const DTYPE: DType = DType::Float64;
}

/// Trait for operations on image buffers.
///
/// This forms the contract between the API layer and operations.
pub trait Operation {
    /// Result of the operation.
    type Output;

    /// Execute the operation.
    ///
    /// # Arguments
    ///
    /// * `buffer`: Canonical image buffer of any supported element type
    fn execute(&self, buffer: &AnyImageBuffer) -> Result<Self::Output, HyperstackError>;
}

/// Trait for operations on numerical image data.
///
/// This trait provides an entry point into the type system based on the runtime `dtype` value.
pub trait NumOperation {
    /// Result of the operation.
    type Output;

    fn execute_t<T: Element>(
        &self,
        buffer: &ImageBuffer<T>,
    ) -> Result<Self::Output, HyperstackError>;
}

impl<O: NumOperation> Operation for O {
    type Output = O::Output;

    /// Execute the operation.
    ///
    /// This method dispatches to `execute_t` based on the buffer's element type.
    fn execute(&self, buffer: &AnyImageBuffer) -> Result<Self::Output, HyperstackError> {
        // Convert runtime data type into concrete types.
        match buffer {
            AnyImageBuffer::Uint8(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Uint16(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Uint32(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Uint64(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Int8(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Int16(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Int32(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Int64(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Float32(buffer) => self.execute_t(buffer),
            AnyImageBuffer::Float64(buffer) => self.execute_t(buffer),
        }
    }
}
