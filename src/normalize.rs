//! Conversion of decoded arrays of rank 2 to 5 into canonical image buffers.

use crate::buffer::{ImageBuffer, Rank, CANONICAL_RANK};
use crate::error::HyperstackError;
use crate::operation::Element;

use ndarray::{ArrayD, Axis, Ix5};
use tracing::{event, Level};

/// Lowest rank accepted by [normalize].
const MIN_RANK: usize = 2;

/// Normalize a raw decoded array into a canonical (Z, T, C, H, W) buffer.
///
/// Missing leading axes are inserted as singletons at the front, so that a rank 4 array is
/// read as (T, C, H, W), a rank 3 array as (C, H, W) and a rank 2 array as (H, W). Only rank 5
/// arrays are tagged [Rank::Rank5]; everything else is logically 4D with a single Z plane.
///
/// The element type is preserved.
///
/// # Arguments
///
/// * `raw`: Decoded array, assumed to be in Z, T, C, H, W order or a trailing subset of it
pub fn normalize<T: Element>(raw: ArrayD<T>) -> Result<ImageBuffer<T>, HyperstackError> {
    let ndim = raw.ndim();
    if !(MIN_RANK..=CANONICAL_RANK).contains(&ndim) || raw.is_empty() {
        return Err(HyperstackError::Shape {
            shape: raw.shape().to_vec(),
        });
    }
    let rank = if ndim == CANONICAL_RANK {
        Rank::Rank5
    } else {
        Rank::Rank4
    };
    let mut data = raw;
    while data.ndim() < CANONICAL_RANK {
        data = data.insert_axis(Axis(0));
    }
    let data = data.into_dimensionality::<Ix5>()?;
    event!(Level::DEBUG, "Normalized rank {} array to {:?} ({})", ndim, data.shape(), rank);
    ImageBuffer::new(data, rank)
}
