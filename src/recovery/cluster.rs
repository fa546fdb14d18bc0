//! Cluster branch of the chamber walker: intersect the entry trajectory
//! with every expected measurement layer of the chamber and pick the best
//! competing cluster per layer, or record a hole.

use super::{ChamberHoleRecovery, KnownChannels};
use crate::errors::RecoveryError;
use crate::geometry::ClusterLayerGeometry;
use crate::ids::{ChamberId, ChannelId, ChannelType, ClusterChannelId};
use crate::prd::{ClusterCollection, ClusterPrd};
use crate::track::{Measurement, TrackParameters, TrackState, TrackStateKind};
use log::debug;

impl ChamberHoleRecovery<'_> {
    pub(super) fn recover_cluster_chamber(
        &self,
        chamber: ChamberId,
        entry: &TrackParameters,
        known: &mut KnownChannels,
    ) -> Result<Vec<TrackState>, RecoveryError> {
        let geometry = self.geometry.cluster_chamber(chamber)?;
        let coll = self.store.cluster_chamber(chamber)?;

        let mut out = Vec::new();
        for (layer_id, layer_geo) in &geometry.layers {
            if known.cluster_layers.contains(layer_id) {
                continue;
            }
            let Some(pars) = self.extrapolator.to_plane(entry, &layer_geo.surface) else {
                debug!("layer {layer_id:?} unreachable from entry parameters");
                continue;
            };
            if !pars.local_error.x.is_finite() || !pars.local_error.y.is_finite() {
                debug!("layer {layer_id:?} skipped, prediction covariance unusable");
                continue;
            }
            let local = pars.local_position;
            if !layer_geo.surface.inside(local, self.params.bounds_tolerance) {
                continue;
            }

            let best = coll.and_then(|c| self.best_cluster(c, layer_geo, &pars));
            let state = match best {
                Some(prd) => {
                    let measurement = Measurement {
                        id: ChannelId::Cluster(prd.id),
                        global_position: prd.global_position,
                        local_position: prd.local_position,
                        error: prd.error,
                    };
                    TrackState::new(pars, TrackStateKind::Measurement(measurement))
                }
                None => {
                    // Channel 0 stands for the whole layer.
                    let id = ClusterChannelId {
                        layer: *layer_id,
                        channel: 0,
                    };
                    TrackState::new(pars, TrackStateKind::Hole(ChannelId::Cluster(id)))
                }
            };
            known.cluster_layers.insert(*layer_id);
            out.push(state);
        }
        Ok(out)
    }

    /// Competing cluster with the smallest pull inside the association cut.
    /// Strict comparison keeps the first of an exact tie.
    fn best_cluster<'c>(
        &self,
        coll: &'c ClusterCollection,
        layer_geo: &ClusterLayerGeometry,
        pars: &TrackParameters,
    ) -> Option<&'c ClusterPrd> {
        let layer_id = layer_geo.layer;
        let cut = if layer_id.measures_phi {
            self.params.association_pull_cut_phi
        } else {
            self.params.association_pull_cut_eta
        };

        let mut best: Option<(&ClusterPrd, f64)> = None;
        for prd in coll.hits.iter().filter(|p| p.id.layer == layer_id) {
            let pull = self.cluster_pull(prd, layer_geo, pars).abs();
            if pull >= cut {
                continue;
            }
            if best.map_or(true, |(_, b)| pull < b) {
                best = Some((prd, pull));
            }
        }
        best.map(|(prd, _)| prd)
    }

    /// Pads are two-dimensional: the residual is the distance of the local
    /// crossing point from the pad rectangle. Strips and wires use the
    /// one-dimensional measurement coordinate.
    fn cluster_pull(
        &self,
        prd: &ClusterPrd,
        layer_geo: &ClusterLayerGeometry,
        pars: &TrackParameters,
    ) -> f64 {
        let var = prd.error * prd.error + pars.local_error.x * pars.local_error.x;
        if var <= 0.0 {
            return f64::MAX;
        }
        let residual = if layer_geo.layer.channel_type == ChannelType::Pad {
            layer_geo.distance_to_pad(pars.local_position, prd.id.channel)
        } else {
            prd.local_position - pars.local_position.x
        };
        residual / var.sqrt()
    }
}
