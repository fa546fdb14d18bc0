//! MDT branch of the chamber walker: intersect the entry trajectory with
//! the tube stack, then classify every crossed tube that is not yet on the
//! track.

use super::{ChamberHoleRecovery, KnownChannels};
use crate::errors::RecoveryError;
use crate::ids::{ChamberId, ChannelId};
use crate::prd::{MdtPrd, MdtStatus};
use crate::track::{Measurement, TrackParameters, TrackState, TrackStateKind};
use log::debug;

/// Crossings ending within this distance of the tube end (mm) are treated
/// as leaving the active volume.
const TUBE_END_MARGIN: f64 = -10.0;

impl ChamberHoleRecovery<'_> {
    pub(super) fn recover_mdt_chamber(
        &self,
        chamber: ChamberId,
        entry: &TrackParameters,
        known: &mut KnownChannels,
    ) -> Result<Vec<TrackState>, RecoveryError> {
        let geometry = self.geometry.mdt_chamber(chamber)?;
        let prds = self.store.mdt_chamber(chamber)?;

        let mut out = Vec::new();
        for crossing in geometry.tubes_crossed(entry.position, entry.direction) {
            if known.tubes.contains(&crossing.id) {
                continue;
            }
            if crossing.r_intersect > geometry.inner_tube_radius
                || crossing.x_intersect > TUBE_END_MARGIN
            {
                continue;
            }
            let Some(surface) = geometry.tube_surface(crossing.id.address) else {
                continue;
            };
            let Some(pars) = self.extrapolator.to_line(entry, &surface) else {
                debug!("tube {:?} unreachable from entry parameters", crossing.id);
                continue;
            };

            let prd = prds.iter().find(|p| p.id == crossing.id);
            let state = match prd {
                None => TrackState::new(pars, TrackStateKind::Hole(ChannelId::MdtTube(crossing.id))),
                Some(prd) => self.classify_mdt_prd(prd, pars),
            };
            known.tubes.insert(crossing.id);
            out.push(state);
        }
        Ok(out)
    }

    fn classify_mdt_prd(&self, prd: &MdtPrd, pars: TrackParameters) -> TrackState {
        let calibrated = self.calibrator.calibrate(prd, &pars);
        let measurement = Measurement {
            id: ChannelId::MdtTube(prd.id),
            global_position: prd.global_position,
            local_position: calibrated.drift_radius,
            error: calibrated.drift_radius_error,
        };

        let noise = prd.adc < self.params.adc_cut || prd.status != MdtStatus::InTime;
        if noise {
            debug!("tube {:?} carries a noise hit, flagging as outlier", prd.id);
            return TrackState::new(pars, TrackStateKind::Outlier(measurement));
        }

        let predicted = pars.local_position.x.abs();
        let pull = measurement.pull(predicted, pars.local_error.x);
        if pull.abs() < self.params.association_pull_cut_eta {
            TrackState::new(pars, TrackStateKind::Measurement(measurement))
        } else {
            if measurement.local_position > predicted {
                debug!(
                    "tube {:?} radius above prediction, likely out of time",
                    prd.id
                );
            }
            TrackState::new(pars, TrackStateKind::Outlier(measurement))
        }
    }
}
