//! Weighted hit arena consumed by the Hough pattern engine.
//!
//! Hits live in an append-only arena addressed by [`HitIdx`] handles; the
//! pattern maxima and the eta↔phi association map store handles instead of
//! references, so nothing dangles when the arena grows.

use crate::ids::{ChannelId, GasGapId, StationKey, Technology};
use nalgebra::Vector3;
use serde::Serialize;
use std::collections::BTreeMap;

/// Stable handle into a [`HoughHitContainer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct HitIdx(pub u32);

/// A single weighted hit in global coordinates.
///
/// `weight` and `probability` are written once by the weighting stage and
/// stay in `[0, 1]`; discarded/noise hits keep exactly 0. The channel
/// identifier and the back-reference into the caller's raw collection are
/// immutable.
#[derive(Clone, Debug)]
pub struct HoughHit {
    pub id: ChannelId,
    pub position: Vector3<f64>,
    pub measures_phi: bool,
    pub weight: f64,
    pub probability: f64,
    /// Index of the originating hit in the caller's PRD collection.
    pub source_index: usize,
}

impl HoughHit {
    pub fn technology(&self) -> Technology {
        self.id.technology()
    }

    /// Transverse radius of the hit position.
    pub fn perp(&self) -> f64 {
        self.position.xy().norm()
    }
}

/// Append-only hit arena with per-technology accounting, valid for one
/// event.
#[derive(Debug, Default)]
pub struct HoughHitContainer {
    hits: Vec<HoughHit>,
    counts: BTreeMap<Technology, usize>,
}

impl HoughHitContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hits: Vec::with_capacity(capacity),
            counts: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, hit: HoughHit) -> HitIdx {
        debug_assert!((0.0..=1.0).contains(&hit.weight));
        debug_assert!((0.0..=1.0).contains(&hit.probability));
        let idx = HitIdx(self.hits.len() as u32);
        *self.counts.entry(hit.technology()).or_insert(0) += 1;
        self.hits.push(hit);
        idx
    }

    pub fn get(&self, idx: HitIdx) -> Option<&HoughHit> {
        self.hits.get(idx.0 as usize)
    }

    pub fn hits(&self) -> &[HoughHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn count(&self, tech: Technology) -> usize {
        self.counts.get(&tech).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HitIdx, &HoughHit)> {
        self.hits
            .iter()
            .enumerate()
            .map(|(i, h)| (HitIdx(i as u32), h))
    }
}

/// Eta-hit → phi-hits association within a gas gap, built once per event
/// while filling the container and read-only afterwards.
#[derive(Debug, Default)]
pub struct EtaPhiAssoc {
    map: BTreeMap<HitIdx, Vec<HitIdx>>,
}

impl EtaPhiAssoc {
    pub fn insert(&mut self, eta: HitIdx, phi_hits: Vec<HitIdx>) {
        if phi_hits.is_empty() {
            return;
        }
        self.map.entry(eta).or_default().extend(phi_hits);
    }

    pub fn phi_hits(&self, eta: HitIdx) -> &[HitIdx] {
        self.map.get(&eta).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Gas-gap scoped phi-hit collector used while filling one collection.
#[derive(Debug, Default)]
pub(crate) struct GasGapPhiMap {
    map: BTreeMap<GasGapId, Vec<HitIdx>>,
}

impl GasGapPhiMap {
    pub(crate) fn insert(&mut self, gap: GasGapId, idx: HitIdx) {
        self.map.entry(gap).or_default().push(idx);
    }

    pub(crate) fn get(&self, gap: &GasGapId) -> &[HitIdx] {
        self.map.get(gap).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Ranges of trigger-chamber hits in the container, keyed by the MDT
/// stations they can confirm. Filled while adding RPC/TGC collections;
/// each collection registers under its own station and the two
/// neighbouring phi sectors.
#[derive(Debug, Default)]
pub struct TriggerStationMap {
    map: BTreeMap<StationKey, Vec<(usize, usize)>>,
}

impl TriggerStationMap {
    /// Register the container range `[begin, end)` of a trigger collection
    /// recorded at `station`.
    pub fn add_range(&mut self, station: StationKey, begin: usize, end: usize) {
        if begin >= end {
            return;
        }
        self.map.entry(station).or_default().push((begin, end));
        for neighbour in station.phi_neighbours() {
            self.map.entry(neighbour).or_default().push((begin, end));
        }
    }

    pub fn ranges(&self, station: &StationKey) -> &[(usize, usize)] {
        self.map.get(station).map(Vec::as_slice).unwrap_or(&[])
    }
}
