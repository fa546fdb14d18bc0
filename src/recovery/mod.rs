//! Chamber hole recovery: reconcile a fitted track against chamber
//! geometry, inserting Hole and Outlier states for crossed channels the
//! fit never saw.
//!
//! The engine walks the track's ordered states. States before the
//! spectrometer entrance and states without a muon channel are copied
//! through untouched; pre-existing holes are dropped and regenerated.
//! Consecutive states of one chamber are accumulated, dispatched to the
//! MDT or cluster path, and the chamber's combined states are re-sorted by
//! distance from the chamber entry before joining the output. Per-channel
//! failures (unreachable surface, bad covariance) skip that candidate
//! only; a chamber the geometry service does not know aborts the track.

mod cluster;
mod mdt;

use crate::errors::RecoveryError;
use crate::geometry::{Extrapolator, GeometryService, MdtCalibrator, PrdStore, SpectrometerBoundary};
use crate::ids::{ChannelId, ClusterLayerId, MdtTubeId, Technology};
use crate::track::{Track, TrackParameters, TrackState};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RecoveryParams {
    /// Pull acceptance for eta-measuring candidates.
    pub association_pull_cut_eta: f64,
    /// Pull acceptance for phi-measuring candidates.
    pub association_pull_cut_phi: f64,
    /// ADC floor below which an MDT candidate counts as noise.
    pub adc_cut: u32,
    /// Extra margin on cluster-layer bounds tests (mm).
    pub bounds_tolerance: f64,
}

impl Default for RecoveryParams {
    fn default() -> Self {
        Self {
            association_pull_cut_eta: 5.0,
            association_pull_cut_phi: 5.0,
            adc_cut: 50,
            bounds_tolerance: 10.0,
        }
    }
}

/// Channels already represented on the track. Grows monotonically while a
/// track is processed; recovered holes never duplicate a known channel.
#[derive(Debug, Default)]
struct KnownChannels {
    tubes: BTreeSet<MdtTubeId>,
    cluster_layers: BTreeSet<ClusterLayerId>,
}

impl KnownChannels {
    fn insert(&mut self, id: ChannelId) {
        match id {
            ChannelId::MdtTube(t) => {
                self.tubes.insert(t);
            }
            ChannelId::Cluster(c) => {
                self.cluster_layers.insert(c.layer);
            }
        }
    }
}

pub struct ChamberHoleRecovery<'a> {
    params: RecoveryParams,
    geometry: &'a GeometryService,
    store: &'a PrdStore,
    extrapolator: &'a dyn Extrapolator,
    calibrator: &'a dyn MdtCalibrator,
    boundary: SpectrometerBoundary,
}

impl<'a> ChamberHoleRecovery<'a> {
    pub fn new(
        params: RecoveryParams,
        geometry: &'a GeometryService,
        store: &'a PrdStore,
        extrapolator: &'a dyn Extrapolator,
        calibrator: &'a dyn MdtCalibrator,
    ) -> Self {
        Self {
            params,
            geometry,
            store,
            extrapolator,
            calibrator,
            boundary: SpectrometerBoundary::default(),
        }
    }

    pub fn with_boundary(mut self, boundary: SpectrometerBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Rebuild the track with recovered Hole/Outlier/Measurement states.
    pub fn recover(&self, track: &Track) -> Result<Track, RecoveryError> {
        if track.states.is_empty() {
            return Err(RecoveryError::EmptyTrack);
        }
        let states = &track.states;
        let mut known = KnownChannels::default();
        let mut out: Vec<TrackState> = Vec::with_capacity(states.len());

        let mut i = 0;
        while i < states.len() {
            let state = &states[i];
            let Some(id) = state.kind.channel() else {
                out.push(state.clone());
                i += 1;
                continue;
            };
            if self.boundary.inside(&state.parameters.position) {
                if !state.kind.is_hole() {
                    out.push(state.clone());
                }
                i += 1;
                continue;
            }
            if state.kind.is_hole() {
                // Regenerated below when the chamber is processed.
                i += 1;
                continue;
            }

            let chamber = id.chamber();
            let entry = state.parameters.clone();
            let mut chunk: Vec<TrackState> = Vec::new();
            while i < states.len() {
                let s = &states[i];
                match s.kind.channel() {
                    Some(cid) if cid.chamber() == chamber => {
                        if !s.kind.is_hole() {
                            known.insert(cid);
                            chunk.push(s.clone());
                        }
                        i += 1;
                    }
                    _ => break,
                }
            }

            debug!(
                "processing chamber {chamber:?} with {} states on track",
                chunk.len()
            );
            let recovered = match chamber.tech {
                Technology::Mdt => self.recover_mdt_chamber(chamber, &entry, &mut known)?,
                _ => self.recover_cluster_chamber(chamber, &entry, &mut known)?,
            };
            chunk.extend(recovered);
            sort_by_entry_distance(&mut chunk, &entry);
            out.extend(chunk);
        }

        Ok(Track {
            states: out,
            fit_quality: track.fit_quality,
        })
    }
}

/// Stable sort along the chamber-entry direction: ties keep the on-track
/// states ahead of recovered ones.
fn sort_by_entry_distance(states: &mut [TrackState], entry: &TrackParameters) {
    states.sort_by(|a, b| {
        let da = (a.parameters.position - entry.position).dot(&entry.direction);
        let db = (b.parameters.position - entry.position).dot(&entry.direction);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{
        MdtChamberGeometry, PassThroughCalibrator, StraightLineExtrapolator,
    };
    use crate::ids::{ChamberId, StationKey, TubeAddress};
    use crate::prd::{MdtPrd, MdtStatus};
    use crate::track::{Measurement, TrackStateKind};
    use nalgebra::{Isometry3, Vector3};

    fn chamber_id() -> ChamberId {
        ChamberId::new(Technology::Mdt, StationKey::new(1, 2, 3))
    }

    fn chamber_geometry() -> MdtChamberGeometry {
        MdtChamberGeometry {
            chamber: chamber_id(),
            transform: Isometry3::translation(5000.0, 0.0, 0.0)
                * Isometry3::rotation(Vector3::y() * std::f64::consts::FRAC_PI_2),
            multilayers: 2,
            layers_per_multilayer: 3,
            tubes_per_layer: 30,
            tube_pitch: 30.0,
            inner_tube_radius: 14.6,
            tube_length: 2000.0,
            multilayer_gap: 170.0,
        }
    }

    fn prd_for(geo: &MdtChamberGeometry, address: TubeAddress, radius: f64) -> MdtPrd {
        let surface = geo.tube_surface(address).expect("valid tube");
        MdtPrd {
            id: crate::ids::MdtTubeId::new(geo.chamber, address),
            global_position: surface.center,
            drift_radius: radius,
            drift_radius_error: 0.2,
            adc: 120,
            status: MdtStatus::InTime,
        }
    }

    /// Drift radius the planted test track would produce in this tube.
    fn planted_radius(geo: &MdtChamberGeometry, address: TubeAddress) -> f64 {
        let surface = geo.tube_surface(address).expect("valid tube");
        let pars = TrackParameters::new(Vector3::new(4600.0, 6.0, 0.0), Vector3::x());
        StraightLineExtrapolator
            .to_line(&pars, &surface)
            .expect("tube is reachable")
            .local_position
            .x
            .abs()
    }

    /// Track along global x through the chamber at y = 6 local, crossing
    /// one tube per layer.
    fn track_through(geo: &MdtChamberGeometry) -> (Track, Vec<TubeAddress>) {
        let position = Vector3::new(4600.0, 6.0, 0.0);
        let direction = Vector3::x();
        let crossings = geo.tubes_crossed(position, direction);
        let crossed: Vec<TubeAddress> = crossings
            .iter()
            .filter(|c| c.r_intersect <= geo.inner_tube_radius)
            .map(|c| c.id.address)
            .collect();
        assert_eq!(crossed.len(), 6, "one in-tube crossing per layer");

        let mut pars = TrackParameters::new(position, direction);
        pars.local_error = nalgebra::Vector2::new(0.3, 0.0);
        let mk_meas = |address: TubeAddress, r: f64| {
            let surface = geo.tube_surface(address).expect("valid tube");
            TrackState::new(
                pars.clone(),
                TrackStateKind::Measurement(Measurement {
                    id: ChannelId::MdtTube(crate::ids::MdtTubeId::new(geo.chamber, address)),
                    global_position: surface.center,
                    local_position: r,
                    error: 0.2,
                }),
            )
        };
        // Fit used the first two crossed tubes only.
        let track = Track::new(vec![
            mk_meas(crossed[0], 3.0),
            mk_meas(crossed[1], 4.0),
        ]);
        (track, crossed)
    }

    struct Fixture {
        geometry: GeometryService,
        store: PrdStore,
    }

    impl Fixture {
        fn new(with_prds_for: &[TubeAddress]) -> Self {
            let geo = chamber_geometry();
            let mut store = PrdStore::default();
            store.enable(Technology::Mdt);
            for &address in with_prds_for {
                let r = planted_radius(&geo, address);
                store.add_mdt(prd_for(&geo, address, r));
            }
            let mut geometry = GeometryService::default();
            geometry.add_mdt_chamber(geo);
            Self { geometry, store }
        }

        fn recover(&self, track: &Track) -> Result<Track, RecoveryError> {
            let ext = StraightLineExtrapolator;
            let cal = PassThroughCalibrator;
            ChamberHoleRecovery::new(
                RecoveryParams::default(),
                &self.geometry,
                &self.store,
                &ext,
                &cal,
            )
            .recover(track)
        }
    }

    #[test]
    fn empty_track_is_an_error() {
        let fixture = Fixture::new(&[]);
        assert!(matches!(
            fixture.recover(&Track::default()),
            Err(RecoveryError::EmptyTrack)
        ));
    }

    #[test]
    fn missing_geometry_is_fatal() {
        let geo = chamber_geometry();
        let (track, _) = track_through(&geo);
        let mut store = PrdStore::default();
        store.enable(Technology::Mdt);
        let geometry = GeometryService::default();
        let ext = StraightLineExtrapolator;
        let cal = PassThroughCalibrator;
        let engine = ChamberHoleRecovery::new(
            RecoveryParams::default(),
            &geometry,
            &store,
            &ext,
            &cal,
        );
        assert!(matches!(
            engine.recover(&track),
            Err(RecoveryError::MissingChamberGeometry(_))
        ));
    }

    #[test]
    fn crossed_tubes_without_prds_become_holes() {
        let geo = chamber_geometry();
        let (track, crossed) = track_through(&geo);
        // PRDs exist only for the two fitted tubes.
        let fixture = Fixture::new(&crossed[..2]);
        let recovered = fixture.recover(&track).expect("recovery runs");
        assert_eq!(recovered.n_measurements(), 2);
        assert_eq!(recovered.n_holes(), 4, "remaining crossed tubes are holes");
        assert!(recovered.states.len() >= track.n_measurements());

        // No channel appears twice.
        let mut seen = BTreeSet::new();
        for s in &recovered.states {
            if let Some(id) = s.kind.channel() {
                assert!(seen.insert(id), "duplicate state for {id:?}");
            }
        }
    }

    #[test]
    fn nearby_prd_is_recovered_as_measurement() {
        let geo = chamber_geometry();
        let (track, crossed) = track_through(&geo);
        // Every crossed tube has a PRD close to the trajectory.
        let fixture = Fixture::new(&crossed);
        let recovered = fixture.recover(&track).expect("recovery runs");
        assert_eq!(recovered.n_holes(), 0);
        assert_eq!(recovered.n_measurements(), 6);
    }

    #[test]
    fn noisy_prd_becomes_outlier() {
        let geo = chamber_geometry();
        let (track, crossed) = track_through(&geo);
        let mut fixture = Fixture::new(&crossed[..2]);
        let mut noisy = prd_for(&geo, crossed[2], planted_radius(&geo, crossed[2]));
        noisy.adc = 5;
        fixture.store.add_mdt(noisy);
        let recovered = fixture.recover(&track).expect("recovery runs");
        let outliers = recovered
            .states
            .iter()
            .filter(|s| matches!(s.kind, TrackStateKind::Outlier(_)))
            .count();
        assert_eq!(outliers, 1);
        assert_eq!(recovered.n_holes(), 3);
    }

    #[test]
    fn preexisting_holes_are_regenerated_not_copied() {
        let geo = chamber_geometry();
        let (mut track, crossed) = track_through(&geo);
        // Plant a stale hole on a tube that has a PRD.
        let pars = track.states[0].parameters.clone();
        track.states.push(TrackState::new(
            pars,
            TrackStateKind::Hole(ChannelId::MdtTube(crate::ids::MdtTubeId::new(
                geo.chamber,
                crossed[2],
            ))),
        ));
        let fixture = Fixture::new(&crossed);
        let recovered = fixture.recover(&track).expect("recovery runs");
        assert_eq!(recovered.n_holes(), 0, "stale hole replaced by the PRD");
        assert_eq!(recovered.n_measurements(), 6);
    }

    #[test]
    fn states_are_ordered_along_the_entry_direction() {
        let geo = chamber_geometry();
        let (track, crossed) = track_through(&geo);
        let fixture = Fixture::new(&crossed[..2]);
        let recovered = fixture.recover(&track).expect("recovery runs");
        let entry = &track.states[0].parameters;
        let distances: Vec<f64> = recovered
            .states
            .iter()
            .map(|s| (s.parameters.position - entry.position).dot(&entry.direction))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1] + 1e-9));
    }

    #[test]
    fn scatterers_pass_through() {
        let geo = chamber_geometry();
        let (mut track, _) = track_through(&geo);
        let pars = TrackParameters::new(Vector3::new(3000.0, 0.0, 0.0), Vector3::x());
        track
            .states
            .insert(0, TrackState::new(pars, TrackStateKind::Scatterer));
        let fixture = Fixture::new(&[]);
        let recovered = fixture.recover(&track).expect("recovery runs");
        assert!(matches!(
            recovered.states[0].kind,
            TrackStateKind::Scatterer
        ));
    }
}
