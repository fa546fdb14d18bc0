//! Identifier types addressing muon-spectrometer channels.
//!
//! The layer/tube keys are structured records with derived total orders
//! rather than hand-packed integers, so grouping and sorting never depend on
//! per-layer channel-count assumptions.

use serde::{Deserialize, Serialize};

/// Detector technology a hit belongs to. Every hit carries exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Technology {
    Mdt,
    Rpc,
    Tgc,
    Csc,
    Mm,
    Stgc,
}

impl Technology {
    /// True for the pre-clustered New Small Wheel technologies whose PRDs
    /// carry a strip list instead of a single channel.
    pub fn is_nsw(self) -> bool {
        matches!(self, Technology::Mm | Technology::Stgc)
    }

    pub fn name(self) -> &'static str {
        match self {
            Technology::Mdt => "MDT",
            Technology::Rpc => "RPC",
            Technology::Tgc => "TGC",
            Technology::Csc => "CSC",
            Technology::Mm => "MM",
            Technology::Stgc => "sTGC",
        }
    }
}

/// Channel flavour within an sTGC gas gap. Other technologies only have
/// strips.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Strip,
    Pad,
    Wire,
}

/// Station address of a chamber: station name index, signed eta index and
/// the phi sector. Barrel phi sectors wrap 1..=8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationKey {
    pub name: u16,
    pub eta: i8,
    pub phi: u8,
}

pub const PHI_SECTORS: u8 = 8;

impl StationKey {
    pub fn new(name: u16, eta: i8, phi: u8) -> Self {
        Self { name, eta, phi }
    }

    /// Neighbouring phi sectors, wrapping around the full circle.
    pub fn phi_neighbours(&self) -> [StationKey; 2] {
        let prev = if self.phi <= 1 { PHI_SECTORS } else { self.phi - 1 };
        let next = if self.phi >= PHI_SECTORS { 1 } else { self.phi + 1 };
        [
            StationKey { phi: prev, ..*self },
            StationKey { phi: next, ..*self },
        ]
    }
}

/// A single chamber of one technology at one station.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChamberId {
    pub tech: Technology,
    pub station: StationKey,
}

impl ChamberId {
    pub fn new(tech: Technology, station: StationKey) -> Self {
        Self { tech, station }
    }
}

/// Tube-layer address inside an MDT chamber. Multilayers and layers count
/// from 1. The derived lexicographic order replaces the source's
/// `4 * multilayer + layer` arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerKey {
    pub multilayer: u8,
    pub layer: u8,
}

impl LayerKey {
    pub fn new(multilayer: u8, layer: u8) -> Self {
        Self { multilayer, layer }
    }
}

/// Chamber-relative tube address: layer plus tube number (from 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TubeAddress {
    pub layer: LayerKey,
    pub tube: u16,
}

impl TubeAddress {
    pub fn new(multilayer: u8, layer: u8, tube: u16) -> Self {
        Self {
            layer: LayerKey::new(multilayer, layer),
            tube,
        }
    }
}

/// Globally unique MDT tube identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MdtTubeId {
    pub chamber: ChamberId,
    pub address: TubeAddress,
}

impl MdtTubeId {
    pub fn new(chamber: ChamberId, address: TubeAddress) -> Self {
        Self { chamber, address }
    }

    /// Identifier of the tube layer, with the tube number dropped.
    pub fn layer_id(&self) -> MdtLayerId {
        MdtLayerId {
            chamber: self.chamber,
            layer: self.address.layer,
        }
    }
}

/// MDT tube-layer identifier (no tube number).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MdtLayerId {
    pub chamber: ChamberId,
    pub layer: LayerKey,
}

/// Gas gap inside a trigger/precision cluster chamber, without the
/// measurement-direction split. Eta and phi strips of the same gap share
/// this id; it keys the eta↔phi association.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GasGapId {
    pub chamber: ChamberId,
    pub multilayer: u8,
    pub gas_gap: u8,
}

/// Measurement layer of a cluster chamber: one gas gap, one channel
/// flavour, one measurement direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterLayerId {
    pub gap: GasGapId,
    pub channel_type: ChannelType,
    pub measures_phi: bool,
}

impl ClusterLayerId {
    pub fn chamber(&self) -> ChamberId {
        self.gap.chamber
    }
}

/// Single cluster channel (strip/pad/wire number inside a layer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterChannelId {
    pub layer: ClusterLayerId,
    pub channel: u16,
}

impl ClusterChannelId {
    pub fn layer_id(&self) -> ClusterLayerId {
        self.layer
    }
}

/// Unified channel identifier carried by measurements on a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    MdtTube(MdtTubeId),
    Cluster(ClusterChannelId),
}

impl ChannelId {
    pub fn technology(&self) -> Technology {
        match self {
            ChannelId::MdtTube(_) => Technology::Mdt,
            ChannelId::Cluster(c) => c.layer.gap.chamber.tech,
        }
    }

    pub fn chamber(&self) -> ChamberId {
        match self {
            ChannelId::MdtTube(t) => t.chamber,
            ChannelId::Cluster(c) => c.layer.gap.chamber,
        }
    }

    pub fn is_mdt(&self) -> bool {
        matches!(self, ChannelId::MdtTube(_))
    }
}
