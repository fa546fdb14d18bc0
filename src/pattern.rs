//! Hough pattern engine contract and the default binned implementation.
//!
//! The engine consumes the weighted hit container and produces candidate
//! maxima independently for the eta projection (transverse radius vs z,
//! eta-measuring hits) and the phi projection (global x vs y,
//! phi-measuring hits). Combining eta and phi maxima into pattern
//! combinations happens downstream through the eta↔phi association map;
//! the engine's only obligations here are determinism and tolerance of an
//! empty container.

use crate::hit::{EtaPhiAssoc, HitIdx, HoughHitContainer};
use log::debug;
use serde::{Deserialize, Serialize};

/// A Hough-space bin over threshold.
#[derive(Clone, Debug, Serialize)]
pub struct Maximum {
    /// Accumulated hit weight in the bin.
    pub weight: f64,
    /// Line angle at the bin centre (rad).
    pub angle: f64,
    /// Signed distance of the line from the origin at the bin centre (mm).
    pub distance: f64,
    pub angle_width: f64,
    pub distance_width: f64,
    /// Hits that voted into this bin.
    pub hits: Vec<HitIdx>,
}

/// Maxima of both projections for one event.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PatternOutput {
    pub eta: Vec<Maximum>,
    pub phi: Vec<Maximum>,
}

impl PatternOutput {
    pub fn is_empty(&self) -> bool {
        self.eta.is_empty() && self.phi.is_empty()
    }
}

/// Pattern finding over a weighted container. Implementations must be
/// deterministic for identical input and return empty output for an empty
/// container instead of failing.
pub trait PatternEngine {
    fn find_patterns(&self, container: &HoughHitContainer, assoc: &EtaPhiAssoc) -> PatternOutput;
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct HoughParams {
    pub angle_bins: usize,
    pub distance_bins: usize,
    /// Largest |signed distance| still binned (mm).
    pub max_distance: f64,
    /// Minimum accumulated weight for a bin to become a maximum.
    pub threshold: f64,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            angle_bins: 180,
            distance_bins: 100,
            max_distance: 16000.0,
            threshold: 1.9,
        }
    }
}

/// Weighted 2D Hough voting over angle × signed distance, run separately
/// per projection.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinnedHoughEngine {
    params: HoughParams,
}

impl BinnedHoughEngine {
    pub fn new(params: HoughParams) -> Self {
        Self { params }
    }

    fn project(
        &self,
        hits: impl Iterator<Item = (HitIdx, f64, f64, f64)>,
    ) -> Vec<Maximum> {
        let p = &self.params;
        let nbins = p.angle_bins * p.distance_bins;
        let mut weights = vec![0.0f64; nbins];
        let mut voters: Vec<Vec<HitIdx>> = vec![Vec::new(); nbins];
        let angle_width = std::f64::consts::PI / p.angle_bins as f64;
        let distance_width = 2.0 * p.max_distance / p.distance_bins as f64;

        for (idx, x, y, weight) in hits {
            if weight < 0.01 {
                continue;
            }
            for ia in 0..p.angle_bins {
                let theta = (ia as f64 + 0.5) * angle_width;
                let d = x * theta.cos() + y * theta.sin();
                if d.abs() >= p.max_distance {
                    continue;
                }
                let id = ((d + p.max_distance) / distance_width) as usize;
                let bin = ia * p.distance_bins + id.min(p.distance_bins - 1);
                weights[bin] += weight;
                voters[bin].push(idx);
            }
        }

        let mut maxima: Vec<(usize, Maximum)> = weights
            .iter()
            .enumerate()
            .filter(|(_, &w)| w >= p.threshold)
            .map(|(bin, &w)| {
                let ia = bin / p.distance_bins;
                let id = bin % p.distance_bins;
                (
                    bin,
                    Maximum {
                        weight: w,
                        angle: (ia as f64 + 0.5) * angle_width,
                        distance: -p.max_distance + (id as f64 + 0.5) * distance_width,
                        angle_width,
                        distance_width,
                        hits: voters[bin].clone(),
                    },
                )
            })
            .collect();
        // Heaviest bins first; the bin index settles exact ties.
        maxima.sort_by(|(ba, a), (bb, b)| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ba.cmp(bb))
        });
        maxima.into_iter().map(|(_, m)| m).collect()
    }
}

impl PatternEngine for BinnedHoughEngine {
    fn find_patterns(&self, container: &HoughHitContainer, assoc: &EtaPhiAssoc) -> PatternOutput {
        if container.is_empty() {
            return PatternOutput::default();
        }
        let eta = self.project(container.iter().filter(|(_, h)| !h.measures_phi).map(
            |(idx, h)| (idx, h.perp(), h.position.z, h.weight),
        ));
        let phi = self.project(container.iter().filter(|(_, h)| h.measures_phi).map(
            |(idx, h)| (idx, h.position.x, h.position.y, h.weight),
        ));
        debug!(
            "hough: {} eta maxima, {} phi maxima, {} eta-phi associations",
            eta.len(),
            phi.len(),
            assoc.len()
        );
        PatternOutput { eta, phi }
    }
}
