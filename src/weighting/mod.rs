//! Per-technology hit weighting.
//!
//! Every raw hit entering the Hough stage gets a participation weight in
//! `[0, 1]` reflecting how likely it belongs to a genuine muon trajectory.
//! MDT chambers get the full treatment (occupancy smoothing, sparse-chamber
//! vetoes, iterative fast-segment flagging, RPC/TGC trigger confirmation);
//! the cluster technologies use a channel-accumulation scheme. Weighting
//! never fails: chambers with insufficient statistics degrade to all-zero
//! weights.

mod cluster;
mod mdt;

use crate::hit::{EtaPhiAssoc, HoughHitContainer, TriggerStationMap};
use crate::metrics::MetricsSink;
use crate::prd::{ClusterCollection, MdtCollection};
use crate::segment::SegmentFinderParams;
use serde::Deserialize;

/// Weighting thresholds. The fractional constants come from tuning against
/// real detector occupancy; keep them as they are.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct WeightingParams {
    /// When off, every surviving hit gets weight 1 and no statistics are
    /// gathered.
    pub hit_reweights: bool,
    /// Apply the ADC noise floor to MDT hits.
    pub mdt_adc_cut: bool,
    pub mdt_adc_min: u32,
    /// Require an in-time drift-time status on MDT hits.
    pub mdt_tdc_cut: bool,
    /// Zero out whole chambers that look like a shower.
    pub shower_skip: bool,
    /// Occupancy above which a large chamber is skipped.
    pub shower_skip_occupancy: f64,
    /// Shower skip only applies to chambers with more hits than this.
    pub shower_skip_min_hits: usize,
    /// Sparse-chamber veto on the smoothed peak tube occupancy. The
    /// fractional threshold accounts for the half-weight neighbour counts.
    pub min_tube_occupancy: f64,
}

impl Default for WeightingParams {
    fn default() -> Self {
        Self {
            hit_reweights: true,
            mdt_adc_cut: true,
            mdt_adc_min: 50,
            mdt_tdc_cut: true,
            shower_skip: true,
            shower_skip_occupancy: 0.3,
            shower_skip_min_hits: 50,
            min_tube_occupancy: 2.01,
        }
    }
}

/// Weighting stage. Feed it one chamber collection at a time; it appends
/// the weighted hits to the shared container and reports every final
/// weight to the metrics sink.
pub struct LayerWeighting<'a> {
    params: WeightingParams,
    segment_params: SegmentFinderParams,
    metrics: &'a dyn MetricsSink,
}

impl<'a> LayerWeighting<'a> {
    pub fn new(params: WeightingParams, metrics: &'a dyn MetricsSink) -> Self {
        Self {
            params,
            segment_params: SegmentFinderParams::default(),
            metrics,
        }
    }

    pub fn with_segment_params(mut self, segment_params: SegmentFinderParams) -> Self {
        self.segment_params = segment_params;
        self
    }

    /// Weight and append one MDT chamber. Trigger collections confirming
    /// this station must already be in the container, with their ranges
    /// registered in the station maps.
    pub fn add_mdt_collection(
        &self,
        coll: &MdtCollection,
        container: &mut HoughHitContainer,
        rpc_stations: &TriggerStationMap,
        tgc_stations: &TriggerStationMap,
    ) {
        mdt::add_mdt_collection(
            &self.params,
            &self.segment_params,
            self.metrics,
            coll,
            container,
            rpc_stations,
            tgc_stations,
        );
    }

    /// Weight and append one cluster chamber (RPC/TGC/CSC/MM/sTGC),
    /// filling the eta↔phi association for its gas gaps. Trigger
    /// technologies additionally register their container range in
    /// `trigger_stations` for later MDT confirmation.
    pub fn add_cluster_collection(
        &self,
        coll: &ClusterCollection,
        container: &mut HoughHitContainer,
        assoc: &mut EtaPhiAssoc,
        trigger_stations: Option<&mut TriggerStationMap>,
    ) {
        cluster::add_cluster_collection(
            &self.params,
            self.metrics,
            coll,
            container,
            assoc,
            trigger_stations,
        );
    }
}
