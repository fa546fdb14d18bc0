//! Seeded segment finding: a convenience front-end that turns track
//! parameters plus a chamber selection into segments.
//!
//! The finder opens a road around the seed trajectory, pulls the MDT PRDs
//! of each requested chamber through per-hit selection and calibration,
//! drives the fast segment finder on the survivors and emits one segment
//! per chamber with a line found. The hole search along the segment is
//! disabled for a chamber when an accepted hit sits within one tube pitch
//! of the chamber edge, where crossings past the last tube would fake
//! holes.

use crate::errors::RecoveryError;
use crate::geometry::{Extrapolator, GeometryService, MdtCalibrator, MdtChamberGeometry, PrdStore};
use crate::ids::{ChamberId, ChannelId, MdtTubeId};
use crate::prd::MdtPrd;
use crate::segment::{fast_segment_finder, DriftCircle, SegmentFinderParams, SegmentSelection};
use crate::track::{FitQuality, TrackParameters};
use log::debug;
use nalgebra::{Vector2, Vector3};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SeededFinderParams {
    /// Residual cut on candidate drift circles, in combined sigma.
    pub n_sigma_from_track: f64,
    /// Road half-widths are this many sigma of the seed's theta error.
    pub road_n_sigma: f64,
    /// Floor on both road half-widths (rad).
    pub min_road_half_width: f64,
    /// Margin past the active wire half-length still accepted (mm).
    pub along_wire_margin: f64,
    pub segment: SegmentFinderParams,
}

impl Default for SeededFinderParams {
    fn default() -> Self {
        Self {
            n_sigma_from_track: 3.0,
            road_n_sigma: 5.0,
            min_road_half_width: 1.0,
            along_wire_margin: 10.0,
            segment: SegmentFinderParams::default(),
        }
    }
}

/// Angular search road around a seed trajectory.
#[derive(Clone, Debug)]
pub struct TrackRoad {
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
    pub delta_eta: f64,
    pub delta_phi: f64,
}

impl TrackRoad {
    pub fn from_parameters(pars: &TrackParameters, n_sigma: f64, floor: f64) -> Self {
        let width = (n_sigma * pars.theta_error).max(floor);
        Self {
            position: pars.position,
            direction: pars.direction,
            delta_eta: width,
            delta_phi: width,
        }
    }

    /// True when `position` lies within the eta/phi half-widths as seen
    /// from the road origin.
    pub fn contains(&self, position: Vector3<f64>) -> bool {
        let v = position - self.position;
        if v.norm() < 1e-9 {
            return true;
        }
        let d_eta = (eta_of(v) - eta_of(self.direction)).abs();
        let d_phi = wrap_angle(v.y.atan2(v.x) - self.direction.y.atan2(self.direction.x)).abs();
        d_eta <= self.delta_eta && d_phi <= self.delta_phi
    }
}

fn eta_of(v: Vector3<f64>) -> f64 {
    let perp = v.xy().norm().max(1e-9);
    (v.z / perp).asinh()
}

fn wrap_angle(a: f64) -> f64 {
    let mut a = a % std::f64::consts::TAU;
    if a > std::f64::consts::PI {
        a -= std::f64::consts::TAU;
    } else if a < -std::f64::consts::PI {
        a += std::f64::consts::TAU;
    }
    a
}

/// Straight-line segment in one chamber.
#[derive(Clone, Debug)]
pub struct MuonSegment {
    pub chamber: ChamberId,
    pub hits: Vec<ChannelId>,
    pub holes: Vec<ChannelId>,
    /// Global point on the segment.
    pub position: Vector3<f64>,
    /// Global unit direction.
    pub direction: Vector3<f64>,
    pub fit_quality: FitQuality,
}

pub struct SeededSegmentFinder<'a> {
    params: SeededFinderParams,
    geometry: &'a GeometryService,
    store: &'a PrdStore,
    extrapolator: &'a dyn Extrapolator,
    calibrator: &'a dyn MdtCalibrator,
}

struct SelectedCircle {
    circle: DriftCircle,
    id: MdtTubeId,
    near_edge: bool,
}

impl<'a> SeededSegmentFinder<'a> {
    pub fn new(
        params: SeededFinderParams,
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
        }
    }

    /// Find one segment per requested MDT chamber, when the chamber's
    /// selected drift circles support a line.
    pub fn find_mdt_segments(
        &self,
        pars: &TrackParameters,
        chambers: &[ChamberId],
    ) -> Result<Vec<MuonSegment>, RecoveryError> {
        let road = TrackRoad::from_parameters(
            pars,
            self.params.road_n_sigma,
            self.params.min_road_half_width,
        );
        let mut out = Vec::new();
        for &chamber in chambers {
            let geometry = self.geometry.mdt_chamber(chamber)?;
            let prds = self.store.mdt_chamber(chamber)?;

            let mut selected = Vec::new();
            for (source_index, prd) in prds.iter().enumerate() {
                if let Some(sel) = self.handle_mdt_prd(&road, pars, geometry, prd, source_index) {
                    selected.push(sel);
                }
            }
            if selected.len() < 2 {
                debug!("chamber {chamber:?}: {} circles after selection, skipping", selected.len());
                continue;
            }

            let circles: Vec<DriftCircle> =
                selected.iter().map(|s| s.circle.clone()).collect();
            let selection = fast_segment_finder(&circles, &self.params.segment);
            let Some(line) = selection.line else {
                continue;
            };
            if selection.n_selected() < 3 {
                continue;
            }

            let search_holes = !selected
                .iter()
                .zip(&selection.selected)
                .any(|(s, &on)| on && s.near_edge);
            out.push(self.build_segment(chamber, geometry, &selected, &selection, line, search_holes));
        }
        Ok(out)
    }

    /// Per-hit selection: propagate the seed to the tube surface, bound
    /// the along-wire coordinate, then cut on the calibrated residual.
    fn handle_mdt_prd(
        &self,
        road: &TrackRoad,
        pars: &TrackParameters,
        geometry: &MdtChamberGeometry,
        prd: &MdtPrd,
        source_index: usize,
    ) -> Option<SelectedCircle> {
        if !road.contains(prd.global_position) {
            return None;
        }
        let surface = geometry.tube_surface(prd.id.address)?;
        let at_tube = self.extrapolator.to_line(pars, &surface)?;
        if at_tube.local_position.y.abs() > surface.half_length + self.params.along_wire_margin {
            return None;
        }

        let calibrated = self.calibrator.calibrate(prd, &at_tube);
        let residual = at_tube.local_position.x.abs() - calibrated.drift_radius;
        let sigma = calibrated
            .drift_radius_error
            .hypot(at_tube.local_error.x)
            .max(1e-6);
        if (residual / sigma).abs() > self.params.n_sigma_from_track {
            return None;
        }

        let center = surface.center;
        Some(SelectedCircle {
            circle: DriftCircle {
                position: Vector2::new(center.xy().norm(), center.z),
                radius: calibrated.drift_radius,
                radius_error: calibrated.drift_radius_error,
                tube_radius: geometry.inner_tube_radius,
                address: prd.id.address,
                source_index,
            },
            id: prd.id,
            near_edge: geometry.tube_near_chamber_edge(prd.id.address),
        })
    }

    fn build_segment(
        &self,
        chamber: ChamberId,
        geometry: &MdtChamberGeometry,
        selected: &[SelectedCircle],
        selection: &SegmentSelection,
        line: crate::geom::Line2,
        search_holes: bool,
    ) -> MuonSegment {
        let on_segment: Vec<&SelectedCircle> = selected
            .iter()
            .zip(&selection.selected)
            .filter(|(_, &on)| on)
            .map(|(s, _)| s)
            .collect();

        // Back to three dimensions through the chamber's azimuth: the
        // drift plane axes are (radial unit at phi, global z).
        let first = on_segment[0];
        let wire = geometry
            .tube_surface(first.circle.address)
            .map(|s| s.center)
            .unwrap_or_else(|| Vector3::new(first.circle.position.x, 0.0, first.circle.position.y));
        let phi = wire.y.atan2(wire.x);
        let radial = Vector3::new(phi.cos(), phi.sin(), 0.0);

        let tangent2 = line.tangent(Vector2::new(1.0, 0.0));
        let direction = (tangent2.x * radial + tangent2.y * Vector3::z()).normalize();
        let foot2 = first.circle.position
            - line.signed_distance(first.circle.position) * line.normal;
        let position = foot2.x * radial + foot2.y * Vector3::z();

        let mut chi2 = 0.0;
        for s in &on_segment {
            let res = line.signed_distance(s.circle.position).abs() - s.circle.radius;
            let err = s.circle.radius_error.max(1e-6);
            chi2 += (res / err) * (res / err);
        }
        let ndof = (on_segment.len() as u32).saturating_sub(2);

        let mut holes = Vec::new();
        if search_holes {
            let on_addresses: Vec<_> = on_segment.iter().map(|s| s.circle.address).collect();
            for crossing in geometry.tubes_crossed(position, direction) {
                if crossing.r_intersect > geometry.inner_tube_radius
                    || crossing.x_intersect > -10.0
                {
                    continue;
                }
                if on_addresses.contains(&crossing.id.address) {
                    continue;
                }
                holes.push(ChannelId::MdtTube(crossing.id));
            }
        }

        debug!(
            "segment in {chamber:?}: {} hits, {} holes, chi2 {chi2:.2}",
            on_segment.len(),
            holes.len()
        );
        MuonSegment {
            chamber,
            hits: on_segment
                .iter()
                .map(|s| ChannelId::MdtTube(s.id))
                .collect(),
            holes,
            position,
            direction,
            fit_quality: FitQuality { chi2, ndof },
        }
    }
}
