//! Descriptive metadata of canonical image buffers.

use crate::buffer::ImageBuffer;
use crate::models::ImageMetadata;
use crate::operation::Element;

/// Returns the metadata record of an image buffer.
///
/// Z and T are reported as 1 when absent from the logical shape.
pub fn extract<T: Element>(buffer: &ImageBuffer<T>) -> ImageMetadata {
    ImageMetadata {
        dtype: buffer.dtype(),
        shape: buffer.shape(),
        z: buffer.z(),
        t: buffer.t(),
        channels: buffer.channels(),
        height: buffer.height(),
        width: buffer.width(),
    }
}
