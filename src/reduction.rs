//! Channel-wise principal component analysis.
//!
//! The channel axis of a canonical buffer is treated as the feature axis and every other axis
//! as a sample axis. The C×C covariance matrix of the centred (samples × channels) matrix is
//! small, so it is eigendecomposed directly with a symmetric eigensolver.

use crate::buffer::{ImageBuffer, Rank, C_AXIS, H_AXIS, T_AXIS, W_AXIS, Z_AXIS};
use crate::error::HyperstackError;
use crate::operation::Element;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};
use tracing::{event, Level};

/// Result of a channel reduction.
#[derive(Clone, Debug)]
pub struct ReductionResult {
    /// Projected data: the source's non-channel axes in their original order with a trailing
    /// axis of size `k`
    pub projected: ArrayD<f64>,
    /// Fraction of the total variance explained by each retained component, non-increasing
    pub explained_variance_ratio: Vec<f64>,
    /// Per-channel mean removed before projection
    pub mean: Array1<f64>,
    /// Principal directions as rows (k × C), in order of descending variance
    pub components: Array2<f64>,
}

impl ReductionResult {
    /// Number of retained components.
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Map the projections back into channel space.
    ///
    /// Returns a (samples × channels) matrix in the same sample order as [feature_matrix].
    pub fn reconstruct(&self) -> Result<Array2<f64>, HyperstackError> {
        let k = self.n_components();
        let samples = self.projected.len() / k;
        let projected =
            Array2::from_shape_vec((samples, k), self.projected.iter().copied().collect())?;
        Ok(projected.dot(&self.components) + &self.mean)
    }
}

/// Returns the (samples × channels) feature matrix of a buffer as `f64`.
///
/// The channel axis is moved last and the remaining axes are collapsed in (Z, T, H, W) order.
pub fn feature_matrix<T: Element>(buffer: &ImageBuffer<T>) -> Result<Array2<f64>, HyperstackError> {
    let channels = buffer.channels();
    let samples = buffer.num_elements() / channels;
    let permuted = buffer.view().permuted_axes([
        Z_AXIS.index(),
        T_AXIS.index(),
        H_AXIS.index(),
        W_AXIS.index(),
        C_AXIS.index(),
    ]);
    let data = permuted.iter().map(|x| x.as_f64()).collect();
    Ok(Array2::from_shape_vec((samples, channels), data)?)
}

/// Flip a direction so that its largest-magnitude loading is positive.
fn orient(mut direction: Array1<f64>) -> Array1<f64> {
    let mut pivot = 0.0_f64;
    for value in direction.iter() {
        if value.abs() > pivot.abs() {
            pivot = *value;
        }
    }
    if pivot < 0.0 {
        direction.mapv_inplace(|x| -x);
    }
    direction
}

/// Reduce the channel axis of a buffer to `k` principal components.
///
/// # Arguments
///
/// * `buffer`: Canonical image buffer
/// * `k`: Number of components to retain, between 1 and the number of channels
pub fn reduce<T: Element>(
    buffer: &ImageBuffer<T>,
    k: usize,
) -> Result<ReductionResult, HyperstackError> {
    let channels = buffer.channels();
    if k < 1 || k > channels {
        return Err(HyperstackError::InvalidComponentCount {
            requested: k,
            channels,
        });
    }

    let features = feature_matrix(buffer)?;
    if features.iter().any(|x| x.is_nan()) {
        return Err(HyperstackError::UndefinedOrder);
    }
    let samples = features.nrows();
    let mean = features.sum_axis(Axis(0)) / samples as f64;
    let centred = features - &mean;
    let ddof = if samples > 1 { 1 } else { 0 };
    let covariance = centred.t().dot(&centred) / (samples - ddof) as f64;

    let eigen = SymmetricEigen::new(DMatrix::from_fn(channels, channels, |i, j| {
        covariance[[i, j]]
    }));
    let mut order: Vec<usize> = (0..channels).collect();
    order.sort_by(|a, b| eigen.eigenvalues[*b].total_cmp(&eigen.eigenvalues[*a]));

    let total_variance: f64 = eigen.eigenvalues.iter().map(|l| l.max(0.0)).sum();
    let mut components = Array2::<f64>::zeros((k, channels));
    let mut explained_variance_ratio = Vec::with_capacity(k);
    for (row, index) in order.iter().take(k).enumerate() {
        let direction = Array1::from_iter(eigen.eigenvectors.column(*index).iter().copied());
        components.row_mut(row).assign(&orient(direction));
        let ratio = if total_variance > 0.0 {
            (eigen.eigenvalues[*index].max(0.0) / total_variance).clamp(0.0, 1.0)
        } else {
            0.0
        };
        explained_variance_ratio.push(ratio);
    }

    let projected = centred.dot(&components.t());
    let mut shape = match buffer.rank() {
        Rank::Rank4 => vec![buffer.t(), buffer.height(), buffer.width()],
        Rank::Rank5 => vec![buffer.z(), buffer.t(), buffer.height(), buffer.width()],
    };
    shape.push(k);
    let projected = ArrayD::from_shape_vec(IxDyn(&shape), projected.iter().copied().collect())?;
    event!(
        Level::DEBUG,
        "Reduced {} channels to {} components over {} samples",
        channels,
        k,
        samples
    );

    Ok(ReductionResult {
        projected,
        explained_variance_ratio,
        mean,
        components,
    })
}
