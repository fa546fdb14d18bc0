//! Event-level front-end of the pattern stage.
//!
//! One call per event: the trigger and cluster collections are weighted
//! first, so that their container ranges are registered per station before
//! any MDT chamber asks for trigger confirmation; the MDT collections
//! follow, and the weighted container is handed to the pattern engine.

use crate::hit::{EtaPhiAssoc, HoughHitContainer, TriggerStationMap};
use crate::metrics::MetricsSink;
use crate::pattern::{PatternEngine, PatternOutput};
use crate::prd::{ClusterCollection, MdtCollection};
use crate::segment::SegmentFinderParams;
use crate::weighting::{LayerWeighting, WeightingParams};
use crate::ids::Technology;
use log::debug;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct FinderConfig {
    pub weighting: WeightingParams,
    pub segment: SegmentFinderParams,
}

/// Everything the pattern stage produces for one event. The container and
/// association map stay alive so downstream combination can resolve the
/// hit handles inside the maxima.
#[derive(Debug, Default)]
pub struct FinderOutput {
    pub patterns: PatternOutput,
    pub container: HoughHitContainer,
    pub assoc: EtaPhiAssoc,
}

pub struct MuonPatternFinder<'a> {
    config: FinderConfig,
    engine: &'a dyn PatternEngine,
    metrics: &'a dyn MetricsSink,
}

impl<'a> MuonPatternFinder<'a> {
    pub fn new(
        config: FinderConfig,
        engine: &'a dyn PatternEngine,
        metrics: &'a dyn MetricsSink,
    ) -> Self {
        Self {
            config,
            engine,
            metrics,
        }
    }

    /// Weight every collection of the event and run the pattern engine.
    pub fn find(
        &self,
        mdt_collections: &[MdtCollection],
        cluster_collections: &[ClusterCollection],
    ) -> FinderOutput {
        let weighting = LayerWeighting::new(self.config.weighting, self.metrics)
            .with_segment_params(self.config.segment);

        let mut container = HoughHitContainer::new();
        let mut assoc = EtaPhiAssoc::default();
        let mut rpc_stations = TriggerStationMap::default();
        let mut tgc_stations = TriggerStationMap::default();

        for coll in cluster_collections {
            let stations = match coll.technology() {
                Some(Technology::Rpc) => Some(&mut rpc_stations),
                Some(Technology::Tgc) => Some(&mut tgc_stations),
                _ => None,
            };
            weighting.add_cluster_collection(coll, &mut container, &mut assoc, stations);
        }
        for coll in mdt_collections {
            weighting.add_mdt_collection(coll, &mut container, &rpc_stations, &tgc_stations);
        }
        debug!(
            "event weighted: {} hits from {} mdt and {} cluster collections",
            container.len(),
            mdt_collections.len(),
            cluster_collections.len()
        );

        let patterns = self.engine.find_patterns(&container, &assoc);
        FinderOutput {
            patterns,
            container,
            assoc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{
        ChamberId, ChannelType, ClusterChannelId, ClusterLayerId, GasGapId, MdtTubeId, StationKey,
        TubeAddress,
    };
    use crate::metrics::NullMetrics;
    use crate::pattern::BinnedHoughEngine;
    use crate::prd::{ClusterPrd, MdtPrd, MdtStatus};
    use nalgebra::{Vector2, Vector3};

    fn mdt_chamber() -> ChamberId {
        ChamberId::new(Technology::Mdt, StationKey::new(2, 1, 4))
    }

    fn drift_radius(perp: f64, z: f64, point: Vector2<f64>, dir: Vector2<f64>) -> f64 {
        let p = Vector2::new(perp, z) - point;
        (p.x * dir.y - p.y * dir.x).abs()
    }

    fn planted_mdt() -> MdtCollection {
        let mut coll = MdtCollection::new(mdt_chamber(), 4, 30, true);
        let point = Vector2::new(5000.0, 500.0);
        let dir = Vector2::new(1.0, 0.1).normalize();
        let wires = [
            (1u8, 1u8, 10u16, 5000.0, 495.0),
            (1, 2, 10, 5030.0, 508.0),
            (1, 3, 10, 5060.0, 512.0),
            (1, 4, 10, 5090.0, 503.0),
            (2, 1, 11, 5260.0, 520.0),
            (2, 2, 11, 5290.0, 535.0),
            (2, 3, 11, 5320.0, 529.0),
            (2, 4, 11, 5350.0, 540.0),
        ];
        for &(ml, lay, tube, perp, z) in &wires {
            coll.push(MdtPrd {
                id: MdtTubeId::new(mdt_chamber(), TubeAddress::new(ml, lay, tube)),
                global_position: Vector3::new(perp, 0.0, z),
                drift_radius: drift_radius(perp, z, point, dir),
                drift_radius_error: 0.1,
                adc: 120,
                status: MdtStatus::InTime,
            });
        }
        coll
    }

    fn rpc_collection() -> ClusterCollection {
        let chamber = ChamberId::new(Technology::Rpc, mdt_chamber().station);
        let mut coll = ClusterCollection::new(chamber, 64);
        for gg in 1..=2u8 {
            for ch in [10u16, 11] {
                for phi in [false, true] {
                    coll.push(ClusterPrd {
                        id: ClusterChannelId {
                            layer: ClusterLayerId {
                                gap: GasGapId {
                                    chamber,
                                    multilayer: 1,
                                    gas_gap: gg,
                                },
                                channel_type: ChannelType::Strip,
                                measures_phi: phi,
                            },
                            channel: ch,
                        },
                        global_position: Vector3::new(7000.0, 0.0, 700.0),
                        local_position: f64::from(ch),
                        error: 5.0,
                        strip_numbers: Vec::new(),
                    });
                }
            }
        }
        coll
    }

    fn run(mdt: &[MdtCollection], clusters: &[ClusterCollection]) -> FinderOutput {
        let engine = BinnedHoughEngine::default();
        let finder = MuonPatternFinder::new(FinderConfig::default(), &engine, &NullMetrics);
        finder.find(mdt, clusters)
    }

    #[test]
    fn empty_event_gives_empty_output() {
        let out = run(&[], &[]);
        assert!(out.patterns.is_empty());
        assert!(out.container.is_empty());
    }

    #[test]
    fn planted_event_produces_eta_maxima() {
        let out = run(&[planted_mdt()], &[rpc_collection()]);
        assert_eq!(out.container.len(), 16);
        assert!(!out.patterns.eta.is_empty());
        for (_, hit) in out.container.iter() {
            assert!((0.0..=1.0).contains(&hit.weight));
            assert!((0.0..=1.0).contains(&hit.probability));
        }
        // The planted track dominates the heaviest eta maximum.
        let best = &out.patterns.eta[0];
        assert!(best.hits.len() >= 6);
    }

    #[test]
    fn eta_phi_association_survives_to_the_output() {
        let out = run(&[], &[rpc_collection()]);
        let eta_with_partners = out
            .container
            .iter()
            .filter(|(idx, h)| !h.measures_phi && !out.assoc.phi_hits(*idx).is_empty())
            .count();
        assert_eq!(eta_with_partners, 4, "each eta strip sees its gap's phi strips");
    }

    #[test]
    fn trigger_order_is_immaterial_for_cluster_only_events() {
        let a = run(&[], &[rpc_collection()]);
        let b = run(&[], &[rpc_collection()]);
        assert_eq!(a.container.len(), b.container.len());
        assert_eq!(a.patterns.eta.len(), b.patterns.eta.len());
    }
}
