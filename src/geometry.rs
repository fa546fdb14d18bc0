//! Detector-description collaborators of the recovery and seeded stages:
//! chamber geometries, a straight-line extrapolator, the per-event PRD
//! store and the calibration hooks.
//!
//! The MDT chamber frame has x along the wires, y across the tubes of a
//! layer and z along the layer stacking; `transform` maps that frame to
//! global coordinates. Cluster layers are bounded planes whose local x axis
//! is the measurement direction.

use crate::errors::RecoveryError;
use crate::geom::{LineSurface, PlaneSurface};
use crate::ids::{
    ChamberId, ChannelType, ClusterLayerId, GasGapId, LayerKey, MdtTubeId, Technology, TubeAddress,
};
use crate::prd::{ClusterCollection, ClusterPrd, MdtPrd};
use crate::track::TrackParameters;
use log::debug;
use nalgebra::{Isometry3, Point3, Unit, Vector2, Vector3};
use std::collections::{BTreeMap, BTreeSet};

/// Crossing of a straight line with one tube, in the tube's own terms.
#[derive(Clone, Debug)]
pub struct TubeIntersect {
    pub id: MdtTubeId,
    /// Unsigned closest-approach distance between the line and the wire.
    pub r_intersect: f64,
    /// Distance of the closest-approach point past the active tube end;
    /// negative inside the tube.
    pub x_intersect: f64,
}

/// Geometry of one MDT chamber.
#[derive(Clone, Debug)]
pub struct MdtChamberGeometry {
    pub chamber: ChamberId,
    /// Chamber-local to global.
    pub transform: Isometry3<f64>,
    pub multilayers: u8,
    pub layers_per_multilayer: u8,
    pub tubes_per_layer: u16,
    pub tube_pitch: f64,
    pub inner_tube_radius: f64,
    pub tube_length: f64,
    /// Spacer height between the two multilayers.
    pub multilayer_gap: f64,
}

impl MdtChamberGeometry {
    pub fn layers(&self) -> impl Iterator<Item = LayerKey> + '_ {
        (1..=self.multilayers).flat_map(move |ml| {
            (1..=self.layers_per_multilayer).map(move |lay| LayerKey::new(ml, lay))
        })
    }

    fn stack_height(&self) -> f64 {
        f64::from(self.multilayers) * f64::from(self.layers_per_multilayer) * self.tube_pitch
            + f64::from(self.multilayers - 1) * self.multilayer_gap
    }

    fn layer_z(&self, layer: LayerKey) -> f64 {
        let base = f64::from(layer.multilayer - 1)
            * (f64::from(self.layers_per_multilayer) * self.tube_pitch + self.multilayer_gap);
        base + (f64::from(layer.layer) - 0.5) * self.tube_pitch - 0.5 * self.stack_height()
    }

    /// Even layers are staggered by half a pitch against odd ones.
    fn layer_stagger(&self, layer: LayerKey) -> f64 {
        if layer.layer % 2 == 0 {
            0.5 * self.tube_pitch
        } else {
            0.0
        }
    }

    fn tube_y(&self, address: TubeAddress) -> f64 {
        (f64::from(address.tube) - 0.5 * f64::from(self.tubes_per_layer + 1)) * self.tube_pitch
            + self.layer_stagger(address.layer)
    }

    fn valid(&self, address: TubeAddress) -> bool {
        (1..=self.multilayers).contains(&address.layer.multilayer)
            && (1..=self.layers_per_multilayer).contains(&address.layer.layer)
            && (1..=self.tubes_per_layer).contains(&address.tube)
    }

    /// Wire position in the chamber frame.
    pub fn tube_position_local(&self, address: TubeAddress) -> Option<Vector3<f64>> {
        if !self.valid(address) {
            return None;
        }
        Some(Vector3::new(
            0.0,
            self.tube_y(address),
            self.layer_z(address.layer),
        ))
    }

    /// Global wire surface of one tube.
    pub fn tube_surface(&self, address: TubeAddress) -> Option<LineSurface> {
        let local = self.tube_position_local(address)?;
        let center = (self.transform * Point3::from(local)).coords;
        let direction = Unit::new_normalize(self.transform * Vector3::x());
        Some(LineSurface::new(center, direction, 0.5 * self.tube_length))
    }

    /// True when the tube sits within one pitch of the chamber side.
    pub fn tube_near_chamber_edge(&self, address: TubeAddress) -> bool {
        if !self.valid(address) {
            return true;
        }
        let half_width = 0.5 * f64::from(self.tubes_per_layer) * self.tube_pitch;
        self.tube_y(address).abs() + self.tube_pitch > half_width
    }

    /// All tubes a straight line crosses, one closest-approach record per
    /// candidate tube. Layers the line runs parallel to are skipped.
    pub fn tubes_crossed(&self, position: Vector3<f64>, direction: Vector3<f64>) -> Vec<TubeIntersect> {
        let p = self
            .transform
            .inverse_transform_point(&Point3::from(position))
            .coords;
        let d = self.transform.inverse_transform_vector(&direction);
        let d = match Unit::try_new(d, 1e-12) {
            Some(u) => u.into_inner(),
            None => return Vec::new(),
        };

        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        let half_length = 0.5 * self.tube_length;
        for layer in self.layers() {
            let z = self.layer_z(layer);
            if d.z.abs() < 1e-9 {
                continue;
            }
            let t_plane = (z - p.z) / d.z;
            let y_at = p.y + t_plane * d.y;
            let stagger = self.layer_stagger(layer);
            let nearest =
                ((y_at - stagger) / self.tube_pitch + 0.5 * f64::from(self.tubes_per_layer + 1))
                    .round() as i64;
            // Inclined lines sweep several tubes while traversing the
            // layer; widen the candidate window with the local slope.
            let spread = (((d.y / d.z).abs() * 0.5).ceil() as i64)
                .min(i64::from(self.tubes_per_layer));
            for cand in nearest - 1 - spread..=nearest + 1 + spread {
                if cand < 1 || cand > i64::from(self.tubes_per_layer) {
                    continue;
                }
                let address = TubeAddress::new(layer.multilayer, layer.layer, cand as u16);
                if !seen.insert(address) {
                    continue;
                }
                let wire = Vector3::new(0.0, self.tube_y(address), z);
                // Closest approach between the track line and the wire,
                // which runs along local x.
                let denom = 1.0 - d.x * d.x;
                if denom < 1e-12 {
                    continue;
                }
                let r0 = p - wire;
                let t = (r0.x * d.x - r0.dot(&d)) / denom;
                let s = r0.x + t * d.x;
                let closest = p + t * d;
                let r_intersect = (closest - Vector3::new(s, wire.y, wire.z)).norm();
                if r_intersect > self.tube_pitch {
                    continue;
                }
                out.push(TubeIntersect {
                    id: MdtTubeId::new(self.chamber, address),
                    r_intersect,
                    x_intersect: s.abs() - half_length,
                });
            }
        }
        out
    }
}

/// sTGC pad tiling of a layer: `cols` pads across local x, rows stacked
/// along local y, channels counting row-major from 1.
#[derive(Clone, Debug)]
pub struct PadGrid {
    pub cols: u16,
    pub pad_size: Vector2<f64>,
}

/// One measurement layer of a cluster chamber.
#[derive(Clone, Debug)]
pub struct ClusterLayerGeometry {
    pub layer: ClusterLayerId,
    pub surface: PlaneSurface,
    pub strip_pitch: f64,
    pub n_channels: u16,
    pub pads: Option<PadGrid>,
}

impl ClusterLayerGeometry {
    /// Local-x coordinate of a channel centre.
    pub fn channel_position(&self, channel: u16) -> f64 {
        (f64::from(channel) - 0.5 * f64::from(self.n_channels + 1)) * self.strip_pitch
    }

    /// Distance of a local point to the rectangle of a pad channel; zero
    /// inside the pad. Layers without pads report the strip residual.
    pub fn distance_to_pad(&self, local: Vector2<f64>, channel: u16) -> f64 {
        let Some(grid) = &self.pads else {
            return (local.x - self.channel_position(channel)).abs();
        };
        let cols = grid.cols.max(1);
        let rows = self.n_channels.div_ceil(cols);
        let idx = channel.saturating_sub(1);
        let col = idx % cols;
        let row = idx / cols;
        let cx = (f64::from(col) + 0.5 - 0.5 * f64::from(cols)) * grid.pad_size.x;
        let cy = (f64::from(row) + 0.5 - 0.5 * f64::from(rows)) * grid.pad_size.y;
        let dx = ((local.x - cx).abs() - 0.5 * grid.pad_size.x).max(0.0);
        let dy = ((local.y - cy).abs() - 0.5 * grid.pad_size.y).max(0.0);
        dx.hypot(dy)
    }
}

/// Geometry of one cluster (trigger or precision strip) chamber.
#[derive(Clone, Debug)]
pub struct ClusterChamberGeometry {
    pub chamber: ChamberId,
    pub layers: BTreeMap<ClusterLayerId, ClusterLayerGeometry>,
}

impl ClusterChamberGeometry {
    pub fn new(chamber: ChamberId) -> Self {
        Self {
            chamber,
            layers: BTreeMap::new(),
        }
    }

    pub fn add_layer(&mut self, geometry: ClusterLayerGeometry) {
        self.layers.insert(geometry.layer, geometry);
    }

    pub fn layer(&self, id: &ClusterLayerId) -> Option<&ClusterLayerGeometry> {
        self.layers.get(id)
    }
}

/// Measurement layers a chamber of the given technology is expected to
/// have. Encodes the per-technology gas-gap conventions, notably the
/// missing phi strips in the middle gap of a TGC triplet and the three
/// sTGC channel flavours per gap.
pub fn standard_cluster_layers(chamber: ChamberId) -> Vec<ClusterLayerId> {
    let gap = |multilayer, gas_gap| GasGapId {
        chamber,
        multilayer,
        gas_gap,
    };
    let layer = |g, channel_type, measures_phi| ClusterLayerId {
        gap: g,
        channel_type,
        measures_phi,
    };
    let mut out = Vec::new();
    match chamber.tech {
        Technology::Mdt => {}
        Technology::Rpc => {
            for ml in 1..=2 {
                for gg in 1..=2 {
                    out.push(layer(gap(ml, gg), ChannelType::Strip, false));
                    out.push(layer(gap(ml, gg), ChannelType::Strip, true));
                }
            }
        }
        Technology::Tgc => {
            for gg in 1..=3 {
                out.push(layer(gap(1, gg), ChannelType::Strip, false));
                // The middle gap of a triplet has no phi strips.
                if gg != 2 {
                    out.push(layer(gap(1, gg), ChannelType::Strip, true));
                }
            }
        }
        Technology::Csc => {
            for gg in 1..=4 {
                out.push(layer(gap(1, gg), ChannelType::Strip, false));
                out.push(layer(gap(1, gg), ChannelType::Strip, true));
            }
        }
        Technology::Mm => {
            for ml in 1..=2 {
                for gg in 1..=4 {
                    out.push(layer(gap(ml, gg), ChannelType::Strip, false));
                }
            }
        }
        Technology::Stgc => {
            for ml in 1..=2 {
                for gg in 1..=4 {
                    out.push(layer(gap(ml, gg), ChannelType::Strip, false));
                    out.push(layer(gap(ml, gg), ChannelType::Wire, true));
                    out.push(layer(gap(ml, gg), ChannelType::Pad, true));
                }
            }
        }
    }
    out
}

/// Registry of chamber geometries. A chamber the caller asks about but the
/// registry does not know is the one hard failure of the recovery stage.
#[derive(Debug, Default)]
pub struct GeometryService {
    mdt: BTreeMap<ChamberId, MdtChamberGeometry>,
    cluster: BTreeMap<ChamberId, ClusterChamberGeometry>,
}

impl GeometryService {
    pub fn add_mdt_chamber(&mut self, geometry: MdtChamberGeometry) {
        self.mdt.insert(geometry.chamber, geometry);
    }

    pub fn add_cluster_chamber(&mut self, geometry: ClusterChamberGeometry) {
        self.cluster.insert(geometry.chamber, geometry);
    }

    pub fn mdt_chamber(&self, id: ChamberId) -> Result<&MdtChamberGeometry, RecoveryError> {
        self.mdt
            .get(&id)
            .ok_or(RecoveryError::MissingChamberGeometry(id))
    }

    pub fn cluster_chamber(&self, id: ChamberId) -> Result<&ClusterChamberGeometry, RecoveryError> {
        self.cluster
            .get(&id)
            .ok_or(RecoveryError::MissingChamberGeometry(id))
    }
}

/// Straight-line propagation to a target surface.
pub trait Extrapolator {
    /// Parameters at the plane; `None` when the trajectory never reaches
    /// it.
    fn to_plane(&self, pars: &TrackParameters, surface: &PlaneSurface) -> Option<TrackParameters>;

    /// Parameters at closest approach to the wire; the first local
    /// coordinate is the signed distance to the wire, the second the
    /// position along it.
    fn to_line(&self, pars: &TrackParameters, surface: &LineSurface) -> Option<TrackParameters>;
}

/// Field-free extrapolator: the trajectory is the straight line through the
/// current parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct StraightLineExtrapolator;

impl Extrapolator for StraightLineExtrapolator {
    fn to_plane(&self, pars: &TrackParameters, surface: &PlaneSurface) -> Option<TrackParameters> {
        let normal = surface.normal();
        let denom = normal.dot(&pars.direction);
        if denom.abs() < 1e-9 {
            return None;
        }
        let t = normal.dot(&(surface.center() - pars.position)) / denom;
        let position = pars.position + t * pars.direction;
        let local = surface.to_local(position);
        let mut out = pars.clone();
        out.position = position;
        out.local_position = local.xy();
        Some(out)
    }

    fn to_line(&self, pars: &TrackParameters, surface: &LineSurface) -> Option<TrackParameters> {
        let w = surface.direction.into_inner();
        let d = pars.direction;
        let dw = d.dot(&w);
        let denom = 1.0 - dw * dw;
        if denom < 1e-12 {
            return None;
        }
        let r0 = pars.position - surface.center;
        let t = (r0.dot(&w) * dw - r0.dot(&d)) / denom;
        let s = r0.dot(&w) + t * dw;
        let position = pars.position + t * d;
        let separation = position - (surface.center + s * w);
        let normal = d.cross(&w);
        let signed_r = if normal.norm() > 1e-12 {
            separation.dot(&normal.normalize())
        } else {
            separation.norm()
        };
        let mut out = pars.clone();
        out.position = position;
        out.local_position = Vector2::new(signed_r, s);
        Some(out)
    }
}

/// Per-event PRD lookup, keyed by chamber. Technologies are enabled
/// explicitly or implicitly by the first insert; a lookup in a technology
/// that was never provided is a missing-container failure, an empty chamber
/// is not.
#[derive(Debug, Default)]
pub struct PrdStore {
    mdt: BTreeMap<ChamberId, Vec<MdtPrd>>,
    cluster: BTreeMap<ChamberId, ClusterCollection>,
    provided: BTreeSet<Technology>,
}

impl PrdStore {
    /// Mark a technology's container as present even when it has no hits.
    pub fn enable(&mut self, tech: Technology) {
        self.provided.insert(tech);
    }

    pub fn add_mdt(&mut self, prd: MdtPrd) {
        self.provided.insert(Technology::Mdt);
        self.mdt.entry(prd.id.chamber).or_default().push(prd);
    }

    pub fn add_cluster(&mut self, prd: ClusterPrd, channel_max: u16) {
        let chamber = prd.chamber();
        self.provided.insert(chamber.tech);
        self.cluster
            .entry(chamber)
            .or_insert_with(|| ClusterCollection::new(chamber, channel_max))
            .push(prd);
    }

    pub fn mdt_chamber(&self, id: ChamberId) -> Result<&[MdtPrd], RecoveryError> {
        if !self.provided.contains(&Technology::Mdt) {
            return Err(RecoveryError::MissingPrdContainer(id));
        }
        Ok(self.mdt.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn cluster_chamber(&self, id: ChamberId) -> Result<Option<&ClusterCollection>, RecoveryError> {
        if !self.provided.contains(&id.tech) {
            return Err(RecoveryError::MissingPrdContainer(id));
        }
        Ok(self.cluster.get(&id))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CalibratedMdt {
    pub drift_radius: f64,
    pub drift_radius_error: f64,
}

/// Track-dependent recalibration hook for MDT drift radii.
pub trait MdtCalibrator {
    fn calibrate(&self, prd: &MdtPrd, pars: &TrackParameters) -> CalibratedMdt;
}

/// Keeps the PRD's own radius and error.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughCalibrator;

impl MdtCalibrator for PassThroughCalibrator {
    fn calibrate(&self, prd: &MdtPrd, _pars: &TrackParameters) -> CalibratedMdt {
        CalibratedMdt {
            drift_radius: prd.drift_radius,
            drift_radius_error: prd.drift_radius_error,
        }
    }
}

/// Cylinder marking the entrance of the muon spectrometer. States inside
/// it belong to the inner detector or calorimeters and are copied through
/// untouched by the recovery walker.
#[derive(Clone, Copy, Debug)]
pub struct SpectrometerBoundary {
    pub radius: f64,
    pub half_z: f64,
}

impl Default for SpectrometerBoundary {
    fn default() -> Self {
        Self {
            radius: 4250.0,
            half_z: 6800.0,
        }
    }
}

impl SpectrometerBoundary {
    pub fn inside(&self, position: &Vector3<f64>) -> bool {
        let within = position.xy().norm() < self.radius && position.z.abs() < self.half_z;
        if within {
            debug!("position {position:?} is before the spectrometer entrance");
        }
        within
    }
}
