//! Extraction of planes and volumes from canonical image buffers.

use crate::buffer::{ImageAxis, ImageBuffer, Rank};
use crate::error::HyperstackError;
use crate::operation::Element;

use ndarray::{s, ArrayView2, ArrayView3};

/// A read-only (H, W) plane aliasing the data of an [ImageBuffer].
pub type SliceView<'a, T> = ArrayView2<'a, T>;

/// Check an index against the size of its axis.
///
/// Returns the index as a `usize` if it is in bounds.
fn check_index(axis: ImageAxis, index: isize, size: usize) -> Result<usize, HyperstackError> {
    match usize::try_from(index) {
        Ok(i) if i < size => Ok(i),
        _ => Err(HyperstackError::IndexOutOfRange { axis, index, size }),
    }
}

/// Returns the (H, W) plane at (z, t, c).
///
/// For 4D images `z` is ignored and only `t` and `c` are checked.
///
/// # Arguments
///
/// * `buffer`: Canonical image buffer
/// * `z`: Depth index
/// * `t`: Time index
/// * `c`: Channel index
pub fn slice<T: Element>(
    buffer: &ImageBuffer<T>,
    z: isize,
    t: isize,
    c: isize,
) -> Result<SliceView<'_, T>, HyperstackError> {
    let z = match buffer.rank() {
        Rank::Rank4 => 0,
        Rank::Rank5 => check_index(ImageAxis::Z, z, buffer.z())?,
    };
    let t = check_index(ImageAxis::Time, t, buffer.t())?;
    let c = check_index(ImageAxis::Channel, c, buffer.channels())?;
    Ok(buffer.view().slice_move(s![z, t, c, .., ..]))
}

/// Returns the (Z, H, W) volume at time point `t` and channel `c`.
///
/// 4D images yield a volume with a single plane.
pub fn volume<T: Element>(
    buffer: &ImageBuffer<T>,
    t: isize,
    c: isize,
) -> Result<ArrayView3<'_, T>, HyperstackError> {
    let t = check_index(ImageAxis::Time, t, buffer.t())?;
    let c = check_index(ImageAxis::Channel, c, buffer.channels())?;
    Ok(buffer.view().slice_move(s![.., t, c, .., ..]))
}
