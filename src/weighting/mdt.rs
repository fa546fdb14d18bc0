//! MDT chamber weighting: occupancy smoothing, sparse-chamber vetoes,
//! iterative fast-segment flagging and RPC/TGC trigger confirmation.

use super::WeightingParams;
use crate::hit::{HitIdx, HoughHit, HoughHitContainer, TriggerStationMap};
use crate::ids::{ChannelId, LayerKey, MdtTubeId, Technology, TubeAddress};
use crate::metrics::MetricsSink;
use crate::prd::{MdtCollection, MdtStatus};
use crate::segment::{fast_segment_finder, DriftCircle, SegmentFinderParams, DEFAULT_TUBE_RADIUS};
use log::{debug, warn};
use nalgebra::Vector2;
use std::collections::BTreeMap;

/// Half-width of the trigger-confirmation window (mm).
const TRIGGER_WINDOW: f64 = 250.0;

struct HitData {
    source_index: usize,
    address: TubeAddress,
    prob: f64,
    weight: f64,
    on_segment: bool,
    psi: f64,
    weighted_trigger: f64,
    confirmed: bool,
    discarded: bool,
}

impl HitData {
    fn layer(&self) -> LayerKey {
        self.address.layer
    }
}

pub(super) fn add_mdt_collection(
    params: &WeightingParams,
    segment_params: &SegmentFinderParams,
    metrics: &dyn MetricsSink,
    coll: &MdtCollection,
    container: &mut HoughHitContainer,
    rpc_stations: &TriggerStationMap,
    tgc_stations: &TriggerStationMap,
) {
    if coll.is_empty() {
        return;
    }

    let passes_cuts = |prd: &crate::prd::MdtPrd| {
        !(params.mdt_tdc_cut && prd.status != MdtStatus::InTime)
            && !(params.mdt_adc_cut && prd.adc <= params.mdt_adc_min)
    };

    let mut data: Vec<HitData> = coll
        .hits
        .iter()
        .enumerate()
        .map(|(i, prd)| HitData {
            source_index: i,
            address: prd.id.address,
            prob: 1.0,
            weight: 1.0,
            on_segment: false,
            psi: 0.0,
            weighted_trigger: 0.0,
            confirmed: false,
            discarded: !passes_cuts(prd),
        })
        .collect();

    // Chambers swamped by a shower contribute position but no weight.
    if params.shower_skip {
        let occupancy = coll.hits.len() as f64 / coll.channel_count() as f64;
        if occupancy > params.shower_skip_occupancy && coll.hits.len() > params.shower_skip_min_hits
        {
            debug!(
                "chamber {:?} skipped, occupancy {occupancy:.3} over {} hits",
                coll.chamber,
                coll.hits.len()
            );
            zero_all(&mut data);
            push_all(metrics, coll, container, &data);
            return;
        }
    }

    if data.iter().all(|d| d.discarded) {
        push_all(metrics, coll, container, &data);
        return;
    }

    if !params.hit_reweights {
        push_all(metrics, coll, container, &data);
        return;
    }

    // Smoothed per-tube occupancy: the hit tube counts 1, each neighbour
    // 0.5. The counter is keyed by tube number alone, so aligned tubes in
    // different layers reinforce each other.
    let mut tubecount: BTreeMap<u16, f64> = BTreeMap::new();
    for d in data.iter().filter(|d| !d.discarded) {
        let tube = d.address.tube;
        *tubecount.entry(tube).or_insert(0.0) += 1.0;
        if tube > 1 {
            *tubecount.entry(tube - 1).or_insert(0.0) += 0.5;
        }
        *tubecount.entry(tube + 1).or_insert(0.0) += 0.5;
    }
    let tubem = tubecount.values().fold(0.0f64, |a, &b| a.max(b));
    if tubem < params.min_tube_occupancy {
        debug!("chamber {:?} too sparse, peak occupancy {tubem}", coll.chamber);
        zero_all(&mut data);
        push_all(metrics, coll, container, &data);
        return;
    }

    // Layer census; isolated tubes are killed outright.
    let mut hits_per_layer: BTreeMap<LayerKey, u32> = BTreeMap::new();
    for d in data.iter_mut().filter(|d| !d.discarded) {
        let count = tubecount.get(&d.address.tube).copied().unwrap_or(0.0);
        if count > 1.0 {
            *hits_per_layer.entry(d.layer()).or_insert(0) += 1;
        } else {
            d.prob = 0.0;
        }
    }
    let (mut ml1, mut ml2) = (0u32, 0u32);
    for layer in hits_per_layer.keys() {
        if layer.multilayer <= 1 {
            ml1 += 1;
        } else {
            ml2 += 1;
        }
    }
    if f64::from(ml1 + ml2) < 2.01 {
        debug!(
            "chamber {:?} has too few populated layers, ml1 {ml1} ml2 {ml2}",
            coll.chamber
        );
        zero_all(&mut data);
        push_all(metrics, coll, container, &data);
        return;
    }

    // Iterative fast-segment flagging: rerun after removing the matched
    // circles, stop when a pass selects fewer than three hits.
    let mut hots_per_layer: BTreeMap<LayerKey, u32> = BTreeMap::new();
    let mut dcs: Vec<DriftCircle> = data
        .iter()
        .filter(|d| !d.discarded && d.prob >= 0.01)
        .map(|d| {
            let prd = &coll.hits[d.source_index];
            DriftCircle {
                position: Vector2::new(prd.global_position.xy().norm(), prd.global_position.z),
                radius: prd.drift_radius,
                radius_error: prd.drift_radius_error,
                tube_radius: DEFAULT_TUBE_RADIUS,
                address: d.address,
                source_index: d.source_index,
            }
        })
        .collect();
    loop {
        let sel = fast_segment_finder(&dcs, segment_params);
        if (sel.n_selected() as f64) < 2.1 {
            break;
        }
        let angle = sel.angle.unwrap_or(0.0);
        let mut kept = Vec::with_capacity(dcs.len() - sel.n_selected());
        for (dc, selected) in dcs.into_iter().zip(&sel.selected) {
            if *selected {
                let d = &mut data[dc.source_index];
                d.on_segment = true;
                d.psi = angle;
                *hots_per_layer.entry(d.layer()).or_insert(0) += 1;
            } else {
                kept.push(dc);
            }
        }
        dcs = kept;
    }

    // Trigger confirmation against RPC/TGC hits of this station and its
    // phi neighbours. The trigger hit's direction from the origin is
    // projected through the chamber; hits within the window pick up a
    // graded trigger weight.
    let station = coll.chamber.station;
    for &(begin, end) in rpc_stations.ranges(&station) {
        for j in begin..end {
            let Some(trigger) = container.get(HitIdx(j as u32)) else {
                continue;
            };
            if trigger.weight < 0.01 {
                continue;
            }
            let perp = trigger.perp();
            let z = trigger.position.z;
            if perp < 1e-6 || z.abs() < 1e-6 {
                continue;
            }
            let rz_ratio = perp / z;
            let inv_rz_ratio = z / perp;
            for d in data.iter_mut().filter(|d| !d.discarded) {
                let gp = coll.hits[d.source_index].global_position;
                let dis = if coll.barrel {
                    gp.z - gp.xy().norm() * inv_rz_ratio
                } else {
                    gp.xy().norm() - rz_ratio * gp.z
                };
                if dis.abs() < TRIGGER_WINDOW {
                    let wnew = 1.5 + (TRIGGER_WINDOW - dis.abs()) / 251.0;
                    d.weighted_trigger = d.weighted_trigger.max(wnew);
                }
            }
        }
    }
    for &(begin, end) in tgc_stations.ranges(&station) {
        for j in begin..end {
            let Some(trigger) = container.get(HitIdx(j as u32)) else {
                continue;
            };
            if trigger.weight < 0.01 {
                continue;
            }
            let z = trigger.position.z;
            if z.abs() < 1e-6 {
                continue;
            }
            let rz_ratio = trigger.perp() / z;
            for d in data.iter_mut().filter(|d| !d.discarded) {
                // A TGC hit anywhere in the station raises the baseline.
                if d.weighted_trigger < 0.1 {
                    d.weighted_trigger = 3.0;
                }
                let gp = coll.hits[d.source_index].global_position;
                let dis = gp.xy().norm() - rz_ratio * gp.z;
                if dis.abs() < TRIGGER_WINDOW {
                    let wnew = 3.5 + (TRIGGER_WINDOW - dis.abs()) / 251.0;
                    d.weighted_trigger = d.weighted_trigger.max(wnew);
                }
            }
        }
    }
    for d in data.iter_mut().filter(|d| !d.discarded) {
        d.confirmed = (d.weighted_trigger > 1.5 && d.weighted_trigger < 2.55)
            || (d.weighted_trigger > 3.5 && d.weighted_trigger < 4.55);
        if d.confirmed && !d.on_segment {
            *hots_per_layer.entry(d.layer()).or_insert(0) += 1;
        }
    }

    // Final weights via the rejection-odds formula.
    for d in data.iter_mut().filter(|d| !d.discarded) {
        if d.prob < 0.01 {
            d.prob = 0.0;
            d.weight = 0.0;
            continue;
        }
        let Some(&layerhits) = hits_per_layer.get(&d.layer()) else {
            warn!("layer {:?} missing from the hit census", d.layer());
            d.weight = d.prob;
            continue;
        };
        let n = f64::from(layerhits);
        let layer_weight = 1.0 / (0.25 * n + 0.75 * n.sqrt());
        if !d.confirmed && !d.on_segment {
            d.prob = (d.prob - 0.2).max(0.0);
            d.weight = d.prob * layer_weight;
        } else {
            let rej = 1.0 / (1.0 - layer_weight + 0.10);
            let rej0 = if d.on_segment && d.confirmed {
                30.0
            } else if d.on_segment {
                1.75 / (d.psi + 0.05)
            } else {
                8.0
            };
            let rej_total = rej * rej0;
            d.prob = rej_total / (1.0 + rej_total);
            match hots_per_layer.get(&d.layer()) {
                Some(&conf) => {
                    let c = f64::from(conf);
                    d.weight = d.prob / (0.25 * c + 0.75 * c.sqrt());
                }
                None => {
                    warn!("layer {:?} missing from the confirmed census", d.layer());
                    d.weight = d.prob;
                }
            }
        }
        debug!(
            "mdt hit {:?} trigger {:.2} on_segment {} psi {:.3} prob {:.3} weight {:.3}",
            d.address, d.weighted_trigger, d.on_segment, d.psi, d.prob, d.weight
        );
    }

    push_all(metrics, coll, container, &data);
}

fn zero_all(data: &mut [HitData]) {
    for d in data {
        d.prob = 0.0;
        d.weight = 0.0;
    }
}

/// Append every hit in collection order. Hits failing the hard cuts go in
/// with weight and probability forced to zero and count as discarded.
fn push_all(
    metrics: &dyn MetricsSink,
    coll: &MdtCollection,
    container: &mut HoughHitContainer,
    data: &[HitData],
) {
    for d in data {
        let prd = &coll.hits[d.source_index];
        let (weight, probability) = if d.discarded {
            (0.0, 0.0)
        } else {
            (d.weight, d.prob)
        };
        container.push(HoughHit {
            id: ChannelId::MdtTube(MdtTubeId::new(coll.chamber, d.address)),
            position: prd.global_position,
            measures_phi: false,
            weight,
            probability,
            source_index: d.source_index,
        });
        if d.discarded {
            metrics.record_discarded(Technology::Mdt);
        } else {
            metrics.record_weight(Technology::Mdt, weight);
        }
    }
}
