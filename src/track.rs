//! Track model shared by the hole-recovery and seeded segment stages.
//!
//! A track is an ordered list of states along the trajectory. Each state
//! carries the parameters at its surface plus what was found there: a
//! measurement used in the fit, a measurement flagged as outlier, a hole
//! (crossed sensor without a hit) or a scatterer. The hole-recovery walker
//! rebuilds the hole states from scratch, so holes on an input track are
//! transient.

use crate::ids::ChannelId;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Track parameters at one point of the trajectory.
///
/// `local_position`/`local_error` live in the frame of the surface the
/// parameters are bound to; for a drift-tube surface the first local
/// coordinate is the signed distance to the wire.
#[derive(Clone, Debug)]
pub struct TrackParameters {
    pub position: Vector3<f64>,
    /// Unit direction of flight.
    pub direction: Vector3<f64>,
    pub local_position: Vector2<f64>,
    pub local_error: Vector2<f64>,
    /// Error on the polar angle, used to open the search road.
    pub theta_error: f64,
}

impl TrackParameters {
    pub fn new(position: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            position,
            direction,
            local_position: Vector2::zeros(),
            local_error: Vector2::zeros(),
            theta_error: 0.0,
        }
    }
}

/// A calibrated measurement sitting on a track state.
#[derive(Clone, Debug)]
pub struct Measurement {
    pub id: ChannelId,
    pub global_position: Vector3<f64>,
    /// Measured local coordinate (signed drift radius for MDT, strip
    /// coordinate for clusters).
    pub local_position: f64,
    pub error: f64,
}

impl Measurement {
    /// Pull of the measurement against predicted local position and error.
    pub fn pull(&self, predicted: f64, predicted_error: f64) -> f64 {
        let var = self.error * self.error + predicted_error * predicted_error;
        if var <= 0.0 {
            return f64::MAX;
        }
        (self.local_position - predicted) / var.sqrt()
    }
}

/// What a track state holds at its surface.
#[derive(Clone, Debug)]
pub enum TrackStateKind {
    Measurement(Measurement),
    Outlier(Measurement),
    /// Crossed channel with no matching hit.
    Hole(ChannelId),
    Scatterer,
}

impl TrackStateKind {
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            TrackStateKind::Measurement(m) | TrackStateKind::Outlier(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_hole(&self) -> bool {
        matches!(self, TrackStateKind::Hole(_))
    }

    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            TrackStateKind::Measurement(m) | TrackStateKind::Outlier(m) => Some(m.id),
            TrackStateKind::Hole(id) => Some(*id),
            TrackStateKind::Scatterer => None,
        }
    }
}

/// One state on the trajectory.
#[derive(Clone, Debug)]
pub struct TrackState {
    pub parameters: TrackParameters,
    pub kind: TrackStateKind,
}

impl TrackState {
    pub fn new(parameters: TrackParameters, kind: TrackStateKind) -> Self {
        Self { parameters, kind }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub chi2: f64,
    pub ndof: u32,
}

/// Ordered trajectory with optional fit quality.
#[derive(Clone, Debug, Default)]
pub struct Track {
    pub states: Vec<TrackState>,
    pub fit_quality: Option<FitQuality>,
}

impl Track {
    pub fn new(states: Vec<TrackState>) -> Self {
        Self {
            states,
            fit_quality: None,
        }
    }

    pub fn n_measurements(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s.kind, TrackStateKind::Measurement(_)))
            .count()
    }

    pub fn n_holes(&self) -> usize {
        self.states.iter().filter(|s| s.kind.is_hole()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ChamberId, MdtTubeId, StationKey, Technology, TubeAddress};

    fn tube_channel() -> ChannelId {
        let chamber = ChamberId::new(Technology::Mdt, StationKey::new(1, 1, 1));
        ChannelId::MdtTube(MdtTubeId::new(chamber, TubeAddress::new(1, 1, 5)))
    }

    #[test]
    fn pull_combines_both_errors() {
        let m = Measurement {
            id: tube_channel(),
            global_position: Vector3::zeros(),
            local_position: 3.0,
            error: 3.0,
        };
        let pull = m.pull(0.0, 4.0);
        assert!((pull - 3.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn track_state_counters() {
        let pars = TrackParameters::new(Vector3::zeros(), Vector3::z());
        let m = Measurement {
            id: tube_channel(),
            global_position: Vector3::zeros(),
            local_position: 1.0,
            error: 0.1,
        };
        let track = Track::new(vec![
            TrackState::new(pars.clone(), TrackStateKind::Measurement(m.clone())),
            TrackState::new(pars.clone(), TrackStateKind::Outlier(m)),
            TrackState::new(pars.clone(), TrackStateKind::Hole(tube_channel())),
            TrackState::new(pars, TrackStateKind::Scatterer),
        ]);
        assert_eq!(track.n_measurements(), 1);
        assert_eq!(track.n_holes(), 1);
    }
}
