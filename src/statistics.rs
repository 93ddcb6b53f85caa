//! Global and per-channel summary statistics.

use crate::buffer::{ImageBuffer, C_AXIS};
use crate::error::HyperstackError;
use crate::models::{ChannelSummary, StatisticsReport, Summary};
use crate::operation::Element;

use ndarray::{ArrayView, Dimension};
use ndarray_stats::QuantileExt;
use rayon::prelude::*;

/// Returns the min, max, mean and population standard deviation of an array.
///
/// Fails with [HyperstackError::EmptyBuffer] if the array has no elements.
pub fn summarise<T: Element, D: Dimension>(
    data: ArrayView<'_, T, D>,
) -> Result<Summary, HyperstackError> {
    if data.is_empty() {
        return Err(HyperstackError::EmptyBuffer);
    }
    let min = data.min()?.as_f64();
    let max = data.max()?.as_f64();
    let count = data.len() as f64;
    let mean = data.iter().map(|x| x.as_f64()).sum::<f64>() / count;
    let variance = data
        .iter()
        .map(|x| {
            let delta = x.as_f64() - mean;
            delta * delta
        })
        .sum::<f64>()
        / count;
    Ok(Summary {
        min,
        max,
        mean,
        std: variance.sqrt(),
    })
}

/// Returns the global and per-channel statistics of a buffer.
///
/// Channels are summarised in parallel and reported in ascending channel order.
pub fn aggregate<T: Element>(buffer: &ImageBuffer<T>) -> Result<StatisticsReport, HyperstackError> {
    let data = buffer.view();
    let global = summarise(data)?;
    let per_channel = data
        .axis_iter(C_AXIS)
        .into_par_iter()
        .enumerate()
        .map(|(channel, view)| {
            summarise(view).map(|summary| ChannelSummary { channel, summary })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StatisticsReport {
        global,
        per_channel,
    })
}
