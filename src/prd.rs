//! Calibrated-but-unassociated detector hits (prep raw data).
//!
//! These are the inputs consumed by the weighting, hole-recovery and seeded
//! segment-finding stages. They are plain value types; the per-event PRD
//! store in [`crate::geometry`] owns them.

use crate::ids::{ChamberId, ClusterChannelId, GasGapId, MdtTubeId, Technology};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Drift-time status of an MDT hit. Only `InTime` hits carry a usable
/// drift-radius measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MdtStatus {
    InTime,
    OutOfTime,
    Masked,
}

/// One MDT drift-circle hit.
#[derive(Clone, Debug)]
pub struct MdtPrd {
    pub id: MdtTubeId,
    pub global_position: Vector3<f64>,
    /// Drift radius in the tube-local frame (mm, unsigned).
    pub drift_radius: f64,
    pub drift_radius_error: f64,
    pub adc: u32,
    pub status: MdtStatus,
}

/// One cluster hit from a trigger or precision strip technology
/// (RPC/TGC/CSC/MM/sTGC).
#[derive(Clone, Debug)]
pub struct ClusterPrd {
    pub id: ClusterChannelId,
    pub global_position: Vector3<f64>,
    /// Position along the measurement direction in the layer frame (mm).
    pub local_position: f64,
    pub error: f64,
    /// Strip numbers contained in a pre-clustered NSW hit; empty for the
    /// single-channel technologies.
    pub strip_numbers: Vec<u16>,
}

impl ClusterPrd {
    pub fn technology(&self) -> Technology {
        self.id.layer.gap.chamber.tech
    }

    pub fn chamber(&self) -> ChamberId {
        self.id.layer.gap.chamber
    }

    pub fn gas_gap(&self) -> GasGapId {
        self.id.layer.gap
    }

    pub fn measures_phi(&self) -> bool {
        self.id.layer.measures_phi
    }
}

/// All MDT hits of one chamber, with the chamber-layout counts the
/// weighting stage needs for occupancy accounting.
#[derive(Clone, Debug)]
pub struct MdtCollection {
    pub chamber: ChamberId,
    pub hits: Vec<MdtPrd>,
    pub layers_per_multilayer: u8,
    pub tubes_per_layer: u16,
    /// Barrel chambers extrapolate trigger hits in z, endcap chambers in
    /// the transverse radius.
    pub barrel: bool,
}

impl MdtCollection {
    pub fn new(
        chamber: ChamberId,
        layers_per_multilayer: u8,
        tubes_per_layer: u16,
        barrel: bool,
    ) -> Self {
        Self {
            chamber,
            hits: Vec::new(),
            layers_per_multilayer,
            tubes_per_layer,
            barrel,
        }
    }

    pub fn push(&mut self, hit: MdtPrd) {
        self.hits.push(hit);
    }

    /// Total channel count, both multilayers.
    pub fn channel_count(&self) -> usize {
        2 * usize::from(self.layers_per_multilayer) * usize::from(self.tubes_per_layer)
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A cluster collection: all hits of one technology in one chamber, the
/// unit processed by the weighting stage.
#[derive(Clone, Debug, Default)]
pub struct ClusterCollection {
    pub chamber: Option<ChamberId>,
    pub hits: Vec<ClusterPrd>,
    /// Highest channel number of the chamber, for occupancy bookkeeping.
    pub channel_max: u16,
}

impl ClusterCollection {
    pub fn new(chamber: ChamberId, channel_max: u16) -> Self {
        Self {
            chamber: Some(chamber),
            hits: Vec::new(),
            channel_max,
        }
    }

    pub fn technology(&self) -> Option<Technology> {
        self.chamber.map(|c| c.tech)
    }

    pub fn push(&mut self, hit: ClusterPrd) {
        self.hits.push(hit);
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
