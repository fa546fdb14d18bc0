//! Fast straight-line segment finder for the drift circles of one chamber.
//!
//! Constructs the tangent lines to all drift-circle pairs taken from two
//! distinct tube layers, matches every circle against each candidate within
//! a fixed road, and keeps the line with the most matched hits (smaller
//! angular deviation from the seed pair's radial direction breaks ties).
//!
//! Enumeration order is part of the contract: seed layers ascending,
//! partner layers descending from the top, hits in container order. With
//! strict comparisons the earliest candidate wins an exact tie, which makes
//! the outcome deterministic for a canonically ordered input.

use crate::geom::{tangent_lines, Circle2, Line2};
use crate::ids::{LayerKey, TubeAddress};
use log::debug;
use nalgebra::Vector2;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Default inner tube radius (mm), used when a circle does not know its
/// readout element.
pub const DEFAULT_TUBE_RADIUS: f64 = 14.6;

/// Drift circle in the chamber's (transverse radius, z) projection.
#[derive(Clone, Debug)]
pub struct DriftCircle {
    /// Position of the wire in the drift plane (mm).
    pub position: Vector2<f64>,
    /// Unsigned drift radius (mm).
    pub radius: f64,
    pub radius_error: f64,
    /// Inner radius of the tube the hit lives in.
    pub tube_radius: f64,
    pub address: TubeAddress,
    /// Index of the hit in the caller's collection.
    pub source_index: usize,
}

impl DriftCircle {
    pub fn layer(&self) -> LayerKey {
        self.address.layer
    }
}

/// Knobs of the fast segment finder.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SegmentFinderParams {
    /// Road half-width around the candidate line (mm).
    pub road_width: f64,
    /// Maximum angle between a tangent candidate and the seed pair's radial
    /// direction (rad); prunes physically implausible seeds.
    pub seed_angle_cut: f64,
    /// Layers with more hits than this are skipped as seeds.
    pub max_seed_layer_hits: usize,
}

impl Default for SegmentFinderParams {
    fn default() -> Self {
        Self {
            road_width: 1.5,
            seed_angle_cut: 0.3,
            max_seed_layer_hits: 10,
        }
    }
}

/// Result of one fast segment search.
#[derive(Clone, Debug, Default)]
pub struct SegmentSelection {
    /// Distinct tube layers with a matched hit in the first / second
    /// multilayer. Tube mates in one layer count once, so `nl1 + nl2`
    /// never exceeds the number of layers present.
    pub nl1: usize,
    pub nl2: usize,
    /// Angular deviation of the winning line from its seed pair's radial
    /// direction; `None` when no candidate was accepted.
    pub angle: Option<f64>,
    /// The winning line itself.
    pub line: Option<Line2>,
    /// One flag per input circle, `true` when the circle lies on the
    /// selected line.
    pub selected: Vec<bool>,
}

impl SegmentSelection {
    /// Number of hits on the selected line.
    pub fn n_selected(&self) -> usize {
        self.selected.iter().filter(|&&s| s).count()
    }

    pub fn found(&self) -> bool {
        self.n_selected() > 0
    }
}

struct Candidate {
    matched: usize,
    nl1: usize,
    nl2: usize,
    psi: f64,
    line: Line2,
    hits: Vec<TubeAddress>,
}

/// Find the straight line matching the most drift circles of one chamber.
///
/// Degenerate inputs are quiet: an empty slice or a configuration where no
/// seed pair survives the angle cut yields `n_selected() == 0`, which the
/// caller must read as "no segment found", not as an error.
pub fn fast_segment_finder(dcs: &[DriftCircle], params: &SegmentFinderParams) -> SegmentSelection {
    let mut out = SegmentSelection {
        selected: vec![false; dcs.len()],
        ..Default::default()
    };
    if dcs.is_empty() {
        return out;
    }

    // Group hits per tube layer and remember where each tube sits in the
    // caller's vector.
    let mut layer_hits: BTreeMap<LayerKey, Vec<usize>> = BTreeMap::new();
    let mut index_of: BTreeMap<TubeAddress, usize> = BTreeMap::new();
    for (i, dc) in dcs.iter().enumerate() {
        layer_hits.entry(dc.layer()).or_default().push(i);
        index_of.insert(dc.address, i);
    }
    let layers: Vec<LayerKey> = layer_hits.keys().copied().collect();

    let mut best: Option<Candidate> = None;
    let mut stop = false;

    'seed: for (li, seed_layer) in layers.iter().enumerate() {
        let seeds_i = &layer_hits[seed_layer];
        if seeds_i.len() > params.max_seed_layer_hits {
            continue;
        }
        for &i in seeds_i {
            let dci = &dcs[i];
            for lj in (li + 1..layers.len()).rev() {
                let seeds_j = &layer_hits[&layers[lj]];
                if seeds_j.len() > params.max_seed_layer_hits {
                    continue;
                }
                for &j in seeds_j {
                    let dcj = &dcs[j];
                    let radial_norm = dcj.position.norm();
                    if radial_norm < 1e-9 {
                        continue;
                    }
                    let radial = dcj.position / radial_norm;
                    let circles = (
                        Circle2::new(dci.position, dci.radius),
                        Circle2::new(dcj.position, dcj.radius),
                    );
                    for line in tangent_lines(&circles.0, &circles.1) {
                        let tangent = line.tangent(dcj.position - dci.position);
                        let cos_psi = tangent.dot(&radial).clamp(-1.0, 1.0);
                        let psi = cos_psi.acos();
                        if psi > params.seed_angle_cut {
                            continue;
                        }

                        let cand = match_circles(dcs, &line, dci.tube_radius, params, psi);
                        let better = match &best {
                            None => cand.matched > 0,
                            Some(b) => {
                                cand.matched > b.matched
                                    || (cand.matched == b.matched && cand.psi < b.psi)
                            }
                        };
                        if better {
                            debug!(
                                "fast_segment_finder: new best matched={} nl1={} nl2={} psi={:.4}",
                                cand.matched, cand.nl1, cand.nl2, cand.psi
                            );
                            let complete = cand.matched >= dcs.len();
                            best = Some(cand);
                            if complete {
                                stop = true;
                            }
                        }
                        if stop {
                            break 'seed;
                        }
                    }
                }
            }
        }
    }

    if let Some(cand) = best {
        out.nl1 = cand.nl1;
        out.nl2 = cand.nl2;
        out.angle = Some(cand.psi);
        out.line = Some(cand.line);
        for address in &cand.hits {
            if let Some(&idx) = index_of.get(address) {
                out.selected[idx] = true;
            } else {
                log::warn!("fast_segment_finder: matched tube {address:?} not in input");
            }
        }
    }
    out
}

fn match_circles(
    dcs: &[DriftCircle],
    line: &Line2,
    tube_radius: f64,
    params: &SegmentFinderParams,
    psi: f64,
) -> Candidate {
    let mut cand = Candidate {
        matched: 0,
        nl1: 0,
        nl2: 0,
        psi,
        line: *line,
        hits: Vec::new(),
    };
    let road = params.road_width;
    let mut layers_hit: BTreeSet<LayerKey> = BTreeSet::new();
    for dc in dcs {
        let dist = line.signed_distance(dc.position).abs();
        if dist > tube_radius.max(dc.tube_radius) + road {
            continue;
        }
        if (dist - dc.radius).abs() > road {
            continue;
        }
        cand.matched += 1;
        if layers_hit.insert(dc.layer()) {
            if dc.address.layer.multilayer <= 1 {
                cand.nl1 += 1;
            } else {
                cand.nl2 += 1;
            }
        }
        cand.hits.push(dc.address);
    }
    cand
}
