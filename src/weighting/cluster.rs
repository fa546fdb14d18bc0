//! Channel-accumulation weighting for the cluster technologies
//! (RPC/TGC/CSC/MM/sTGC).
//!
//! Each hit bumps its own channel by 1 and the neighbouring channels by
//! 0.55; a hit only counts towards its layer's statistics when it has an
//! accumulated neighbour and the chamber has at least two active layers.
//! The layer weight is `1/(0.25·√n + 0.75·n)`, halved when exactly two
//! layers are active. NSW hits arrive pre-clustered and iterate their
//! contained strip numbers instead of a single channel.

use super::WeightingParams;
use crate::hit::{EtaPhiAssoc, GasGapPhiMap, HoughHit, HoughHitContainer, TriggerStationMap};
use crate::ids::{ChannelId, ChannelType, ClusterLayerId, Technology};
use crate::metrics::MetricsSink;
use crate::prd::{ClusterCollection, ClusterPrd};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

type ChannelKey = (ChannelType, bool, u16);

fn kernel_channels(prd: &ClusterPrd) -> Vec<u16> {
    if prd.technology().is_nsw() && !prd.strip_numbers.is_empty() {
        prd.strip_numbers.clone()
    } else {
        vec![prd.id.channel]
    }
}

fn bump(weights: &mut BTreeMap<ChannelKey, f64>, key: ChannelKey) {
    let (ty, phi, ch) = key;
    if ch > 0 {
        *weights.entry((ty, phi, ch - 1)).or_insert(0.0) += 0.55;
    }
    *weights.entry(key).or_insert(0.0) += 1.0;
    *weights.entry((ty, phi, ch + 1)).or_insert(0.0) += 0.55;
}

pub(super) fn add_cluster_collection(
    params: &WeightingParams,
    metrics: &dyn MetricsSink,
    coll: &ClusterCollection,
    container: &mut HoughHitContainer,
    assoc: &mut EtaPhiAssoc,
    trigger_stations: Option<&mut TriggerStationMap>,
) {
    if coll.is_empty() {
        return;
    }
    let Some(tech) = coll.technology() else {
        return;
    };

    // Channel accumulation and active-layer census.
    let mut channel_weights: BTreeMap<ChannelKey, f64> = BTreeMap::new();
    let mut layers: BTreeSet<ClusterLayerId> = BTreeSet::new();
    if params.hit_reweights {
        for prd in &coll.hits {
            layers.insert(prd.id.layer);
            let phi = prd.measures_phi();
            for ch in kernel_channels(prd) {
                bump(&mut channel_weights, (prd.id.layer.channel_type, phi, ch));
            }
        }
    }

    // A hit counts for its layer only with an adjacent accumulated channel
    // and at least two active layers in the chamber.
    let mut hits_per_layer: BTreeMap<ClusterLayerId, u32> = BTreeMap::new();
    if params.hit_reweights {
        for prd in &coll.hits {
            let key = (
                prd.id.layer.channel_type,
                prd.measures_phi(),
                prd.id.channel,
            );
            let accumulated = channel_weights.get(&key).copied().unwrap_or(0.0);
            let counts = layers.len() > 1 && accumulated > 1.0;
            *hits_per_layer.entry(prd.id.layer).or_insert(0) += u32::from(counts);
        }
    }

    let begin = container.len();
    let mut phi_map = GasGapPhiMap::default();
    let mut indices = Vec::with_capacity(coll.hits.len());
    for (source_index, prd) in coll.hits.iter().enumerate() {
        let weight = if params.hit_reweights {
            let n = hits_per_layer.get(&prd.id.layer).copied().unwrap_or(0);
            let mut w = if n > 0 {
                1.0 / (0.25 * f64::from(n).sqrt() + 0.75 * f64::from(n))
            } else {
                0.0
            };
            if layers.len() == 2 {
                w /= 2.0;
            }
            w
        } else {
            1.0
        };
        let probability = if weight > 0.0 { 1.0 } else { 0.0 };

        let idx = container.push(HoughHit {
            id: ChannelId::Cluster(prd.id),
            position: prd.global_position,
            measures_phi: prd.measures_phi(),
            weight,
            probability,
            source_index,
        });
        debug!("cluster hit {:?} weight {weight:.4}", prd.id);
        metrics.record_weight(tech, weight);
        if prd.measures_phi() {
            phi_map.insert(prd.gas_gap(), idx);
        }
        indices.push(idx);
    }

    // Eta hits adopt every phi hit of their own gas gap.
    for (prd, idx) in coll.hits.iter().zip(&indices) {
        if !prd.measures_phi() {
            assoc.insert(*idx, phi_map.get(&prd.gas_gap()).to_vec());
        }
    }

    if matches!(tech, Technology::Rpc | Technology::Tgc) {
        if let (Some(map), Some(chamber)) = (trigger_stations, coll.chamber) {
            map.add_range(chamber.station, begin, container.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ChamberId, ClusterChannelId, GasGapId, StationKey};
    use crate::metrics::NullMetrics;
    use nalgebra::Vector3;

    fn chamber(tech: Technology) -> ChamberId {
        ChamberId::new(tech, StationKey::new(2, 1, 4))
    }

    fn prd(ch: ChamberId, gas_gap: u8, phi: bool, channel: u16) -> ClusterPrd {
        ClusterPrd {
            id: ClusterChannelId {
                layer: ClusterLayerId {
                    gap: GasGapId {
                        chamber: ch,
                        multilayer: 1,
                        gas_gap,
                    },
                    channel_type: ChannelType::Strip,
                    measures_phi: phi,
                },
                channel,
            },
            global_position: Vector3::new(7000.0, 0.0, 100.0 * f64::from(gas_gap)),
            local_position: f64::from(channel),
            error: 5.0,
            strip_numbers: Vec::new(),
        }
    }

    fn run(coll: &ClusterCollection) -> (HoughHitContainer, EtaPhiAssoc, TriggerStationMap) {
        let params = WeightingParams::default();
        let mut container = HoughHitContainer::new();
        let mut assoc = EtaPhiAssoc::default();
        let mut stations = TriggerStationMap::default();
        add_cluster_collection(
            &params,
            &NullMetrics,
            coll,
            &mut container,
            &mut assoc,
            Some(&mut stations),
        );
        (container, assoc, stations)
    }

    #[test]
    fn adjacent_channels_share_full_weight() {
        let ch = chamber(Technology::Rpc);
        let mut coll = ClusterCollection::new(ch, 64);
        // Two adjacent strips in two layers: every hit has a neighbour.
        for gg in 1..=2u8 {
            coll.push(prd(ch, gg, false, 10));
            coll.push(prd(ch, gg, false, 11));
        }
        let (container, _, _) = run(&coll);
        assert_eq!(container.len(), 4);
        let n = 2.0f64;
        let expected = 1.0 / (0.25 * n.sqrt() + 0.75 * n) / 2.0;
        for (_, hit) in container.iter() {
            assert!((hit.weight - expected).abs() < 1e-12);
            assert_eq!(hit.probability, 1.0);
        }
    }

    #[test]
    fn isolated_channel_gets_zero_weight() {
        let ch = chamber(Technology::Rpc);
        let mut coll = ClusterCollection::new(ch, 64);
        coll.push(prd(ch, 1, false, 10));
        coll.push(prd(ch, 2, false, 40));
        let (container, _, _) = run(&coll);
        for (_, hit) in container.iter() {
            assert_eq!(hit.weight, 0.0);
            assert_eq!(hit.probability, 0.0);
        }
    }

    #[test]
    fn eta_hits_pick_up_their_gap_phi_hits() {
        let ch = chamber(Technology::Rpc);
        let mut coll = ClusterCollection::new(ch, 64);
        coll.push(prd(ch, 1, false, 10));
        coll.push(prd(ch, 1, true, 20));
        coll.push(prd(ch, 2, false, 10));
        let (container, assoc, _) = run(&coll);
        let eta_first = container
            .iter()
            .find(|(_, h)| !h.measures_phi)
            .map(|(i, _)| i)
            .expect("eta hit present");
        assert_eq!(assoc.phi_hits(eta_first).len(), 1);
        // The gap-2 eta hit has no phi partner.
        let gap2 = container
            .iter()
            .filter(|(_, h)| !h.measures_phi)
            .map(|(i, _)| i)
            .nth(1)
            .expect("second eta hit");
        assert!(assoc.phi_hits(gap2).is_empty());
    }

    #[test]
    fn trigger_collections_register_their_range() {
        let ch = chamber(Technology::Tgc);
        let mut coll = ClusterCollection::new(ch, 64);
        coll.push(prd(ch, 1, false, 10));
        coll.push(prd(ch, 1, false, 11));
        let (_, _, stations) = run(&coll);
        assert_eq!(stations.ranges(&ch.station), &[(0, 2)]);
    }

    #[test]
    fn nsw_strip_lists_feed_the_kernel() {
        let ch = chamber(Technology::Mm);
        let mut coll = ClusterCollection::new(ch, 128);
        let mut a = prd(ch, 1, false, 10);
        a.strip_numbers = vec![9, 10, 11];
        let mut b = prd(ch, 2, false, 10);
        b.strip_numbers = vec![10, 11];
        coll.push(a);
        coll.push(b);
        let (container, _, _) = run(&coll);
        for (_, hit) in container.iter() {
            assert!(hit.weight > 0.0, "clustered strips confirm each other");
        }
    }
}
