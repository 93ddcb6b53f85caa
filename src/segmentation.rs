//! Per-plane segmentation of 2D planes and 3D volumes.

use crate::error::HyperstackError;
use crate::operation::Element;

use std::collections::BTreeMap;
use std::str::FromStr;

use ndarray::{Array2, Array3, ArrayView, ArrayView2, ArrayView3, Axis, Dimension};
use ndarray_stats::QuantileExt;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{event, Level};

/// Integer label assigned to each pixel of a mask.
pub type Label = u32;

/// Number of histogram bins used by Otsu's method.
const OTSU_BINS: usize = 256;

/// Maximum number of k-means refinement iterations.
const KMEANS_MAX_ITERATIONS: usize = 300;

/// k-means convergence tolerance, relative to the variance of the intensities.
const KMEANS_TOLERANCE: f64 = 1e-4;

/// Segmentation algorithms.
#[derive(Clone, Copy, Debug, Deserialize, Display, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationMethod {
    /// Binary mask from Otsu's global threshold
    #[strum(serialize = "otsu")]
    Otsu,
    /// Label mask from k-means clustering of intensities
    #[strum(serialize = "kmeans")]
    KMeans,
}

impl FromStr for SegmentationMethod {
    type Err = HyperstackError;

    /// Parse a method name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "otsu" => Ok(Self::Otsu),
            "kmeans" => Ok(Self::KMeans),
            _ => Err(HyperstackError::UnknownMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// Parameters of the segmentation methods.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentationParams {
    /// Number of k-means clusters
    pub n_clusters: usize,
    /// Seed of the k-means initialisation
    pub seed: u64,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            seed: 42,
        }
    }
}

/// Returns the Otsu threshold of a plane.
///
/// Intensities are binned into a 256-bin histogram spanning [min, max]. The result is the
/// centre of the bin that maximises the between-class variance; where several bins do, the
/// lowest wins. A constant plane thresholds at its value.
pub fn otsu_level<T: Element>(plane: ArrayView2<'_, T>) -> Result<f64, HyperstackError> {
    if plane.is_empty() {
        return Err(HyperstackError::EmptyBuffer);
    }
    let min = plane.min()?.as_f64();
    let max = plane.max()?.as_f64();
    if max <= min {
        return Ok(min);
    }

    let width = (max - min) / OTSU_BINS as f64;
    let mut histogram = [0.0_f64; OTSU_BINS];
    for value in plane.iter() {
        let bin = ((value.as_f64() - min) / width) as usize;
        histogram[bin.min(OTSU_BINS - 1)] += 1.0;
    }
    let centres: Vec<f64> = (0..OTSU_BINS)
        .map(|bin| min + (bin as f64 + 0.5) * width)
        .collect();

    // Class weights and sums below and above each bin boundary.
    let total_weight: f64 = histogram.iter().sum();
    let total_sum: f64 = histogram.iter().zip(&centres).map(|(n, c)| n * c).sum();
    let mut weight_low = 0.0;
    let mut sum_low = 0.0;
    let mut best_variance = f64::NEG_INFINITY;
    let mut level = centres[0];
    for bin in 0..OTSU_BINS - 1 {
        weight_low += histogram[bin];
        sum_low += histogram[bin] * centres[bin];
        let weight_high = total_weight - weight_low;
        if weight_low == 0.0 || weight_high == 0.0 {
            continue;
        }
        let mean_low = sum_low / weight_low;
        let mean_high = (total_sum - sum_low) / weight_high;
        let variance = weight_low * weight_high * (mean_low - mean_high).powi(2);
        if variance > best_variance {
            best_variance = variance;
            level = centres[bin];
        }
    }
    Ok(level)
}

/// Returns a binary mask of a plane: 1 where the value is at least the Otsu threshold, else 0.
pub fn otsu_threshold<T: Element>(
    plane: ArrayView2<'_, T>,
) -> Result<Array2<Label>, HyperstackError> {
    let level = otsu_level(plane)?;
    Ok(plane.mapv(|x| Label::from(x.as_f64() >= level)))
}

/// Index of the centroid nearest to a value. Ties go to the lowest index.
fn nearest(centroids: &[f64], value: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = (value - centroid).abs();
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

/// k-means++ initialisation.
fn seed_centroids(values: &[f64], n_clusters: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centroids = Vec::with_capacity(n_clusters);
    centroids.push(values[rng.random_range(0..values.len())]);
    let mut distances: Vec<f64> = values.iter().map(|v| (v - centroids[0]).powi(2)).collect();
    while centroids.len() < n_clusters {
        let total: f64 = distances.iter().sum();
        let index = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0_f64;
            distances
                .iter()
                .position(|d| {
                    cumulative += d;
                    cumulative > target
                })
                .unwrap_or(values.len() - 1)
        } else {
            // Fewer distinct values than clusters.
            rng.random_range(0..values.len())
        };
        let centroid = values[index];
        centroids.push(centroid);
        for (distance, value) in distances.iter_mut().zip(values) {
            *distance = distance.min((value - centroid).powi(2));
        }
    }
    centroids
}

/// Cluster the intensities of a plane with k-means.
///
/// Labels are numbered by ascending centroid intensity, so label 0 is the darkest cluster.
/// The result is fully determined by the plane, `n_clusters` and `seed`.
///
/// # Arguments
///
/// * `plane`: 2D plane
/// * `n_clusters`: Number of clusters, between 1 and the number of pixels
/// * `seed`: Seed of the centroid initialisation
pub fn kmeans_segment<T: Element>(
    plane: ArrayView2<'_, T>,
    n_clusters: usize,
    seed: u64,
) -> Result<Array2<Label>, HyperstackError> {
    let pixels = plane.len();
    if n_clusters < 1 || n_clusters > pixels {
        return Err(HyperstackError::InvalidClusterCount {
            requested: n_clusters,
            pixels,
        });
    }
    let values: Vec<f64> = plane.iter().map(|x| x.as_f64()).collect();
    if values.iter().any(|v| v.is_nan()) {
        return Err(HyperstackError::UndefinedOrder);
    }

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let tolerance = KMEANS_TOLERANCE * variance;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = seed_centroids(&values, n_clusters, &mut rng);
    let mut assignment = vec![0_usize; values.len()];
    for iteration in 0..KMEANS_MAX_ITERATIONS {
        for (label, value) in assignment.iter_mut().zip(&values) {
            *label = nearest(&centroids, *value);
        }
        let mut sums = vec![0.0_f64; n_clusters];
        let mut counts = vec![0_usize; n_clusters];
        for (label, value) in assignment.iter().zip(&values) {
            sums[*label] += value;
            counts[*label] += 1;
        }
        let mut shift = 0.0;
        for cluster in 0..n_clusters {
            // Empty clusters keep their centroid.
            if counts[cluster] > 0 {
                let updated = sums[cluster] / counts[cluster] as f64;
                shift += (updated - centroids[cluster]).powi(2);
                centroids[cluster] = updated;
            }
        }
        if shift <= tolerance {
            event!(Level::TRACE, "k-means converged after {} iterations", iteration + 1);
            break;
        }
    }
    for (label, value) in assignment.iter_mut().zip(&values) {
        *label = nearest(&centroids, *value);
    }

    // Renumber clusters by ascending centroid.
    let mut order: Vec<usize> = (0..n_clusters).collect();
    order.sort_by(|a, b| centroids[*a].total_cmp(&centroids[*b]));
    let mut relabel = vec![0; n_clusters];
    for (new, old) in order.iter().enumerate() {
        relabel[*old] = Label::try_from(new)?;
    }
    let labels = assignment.iter().map(|label| relabel[*label]).collect();
    Ok(Array2::from_shape_vec(plane.raw_dim(), labels)?)
}

/// Segment a single plane with the given method.
pub fn segment_plane<T: Element>(
    plane: ArrayView2<'_, T>,
    method: SegmentationMethod,
    params: &SegmentationParams,
) -> Result<Array2<Label>, HyperstackError> {
    match method {
        SegmentationMethod::Otsu => otsu_threshold(plane),
        SegmentationMethod::KMeans => kmeans_segment(plane, params.n_clusters, params.seed),
    }
}

/// Segment every plane along the leading axis of a volume independently.
///
/// Planes are processed in parallel; the output keeps the input plane order.
///
/// # Arguments
///
/// * `volume`: 3D volume, e.g. (Z, H, W)
/// * `method`: Method name, `otsu` or `kmeans` in any case
/// * `params`: Method parameters
pub fn segment_volume<T: Element>(
    volume: ArrayView3<'_, T>,
    method: &str,
    params: &SegmentationParams,
) -> Result<Array3<Label>, HyperstackError> {
    let method = method.parse::<SegmentationMethod>()?;
    if volume.is_empty() {
        return Ok(Array3::zeros(volume.raw_dim()));
    }
    let planes = volume
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|plane| segment_plane(plane, method, params))
        .collect::<Result<Vec<_>, _>>()?;
    event!(
        Level::DEBUG,
        "Segmented {} planes of shape {:?} with {}",
        planes.len(),
        &volume.shape()[1..],
        method
    );
    let views: Vec<_> = planes.iter().map(|plane| plane.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

/// Returns the number of pixels carrying each label of a mask.
pub fn label_counts<D: Dimension>(mask: ArrayView<'_, Label, D>) -> BTreeMap<Label, usize> {
    let mut counts = BTreeMap::new();
    for label in mask.iter() {
        *counts.entry(*label).or_insert(0) += 1;
    }
    counts
}

/// Returns the fraction of pixels of a mask with a non-zero label.
pub fn foreground_fraction<D: Dimension>(mask: ArrayView<'_, Label, D>) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|label| **label != 0).count() as f64 / mask.len() as f64
}
