//! Synthetic single-muon event builders shared by the integration tests.
#![allow(dead_code)]

use muon_hough::geometry::{MdtChamberGeometry, StraightLineExtrapolator, Extrapolator};
use muon_hough::ids::{
    ChamberId, ChannelType, ClusterChannelId, ClusterLayerId, GasGapId, MdtTubeId, StationKey,
    Technology, TubeAddress,
};
use muon_hough::prd::{ClusterCollection, ClusterPrd, MdtCollection, MdtPrd, MdtStatus};
use muon_hough::track::TrackParameters;
use nalgebra::{Isometry3, Vector2, Vector3};

pub fn mdt_station() -> ChamberId {
    ChamberId::new(Technology::Mdt, StationKey::new(2, 1, 4))
}

/// The planted muon in the (transverse radius, z) projection: a line
/// through the origin at slope 0.1 crossing the chamber near r = 5000.
pub fn planted_point() -> Vector2<f64> {
    Vector2::new(5000.0, 500.0)
}

pub fn planted_dir() -> Vector2<f64> {
    Vector2::new(1.0, 0.1).normalize()
}

/// Drift radius a wire at `(perp, z)` measures for the planted line.
pub fn drift_radius(perp: f64, z: f64) -> f64 {
    let p = Vector2::new(perp, z) - planted_point();
    let d = planted_dir();
    (p.x * d.y - p.y * d.x).abs()
}

fn mdt_prd(ml: u8, lay: u8, tube: u16, perp: f64, z: f64) -> MdtPrd {
    MdtPrd {
        id: MdtTubeId::new(mdt_station(), TubeAddress::new(ml, lay, tube)),
        global_position: Vector3::new(perp, 0.0, z),
        drift_radius: drift_radius(perp, z),
        drift_radius_error: 0.1,
        adc: 120,
        status: MdtStatus::InTime,
    }
}

/// Noise-free single muon through all eight tube layers.
pub fn planted_mdt_collection() -> MdtCollection {
    let mut coll = MdtCollection::new(mdt_station(), 4, 30, true);
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
        coll.push(mdt_prd(ml, lay, tube, perp, z));
    }
    coll
}

/// RPC strips on the planted trajectory, two gas gaps with eta and phi
/// views, adjacent channels so the accumulation kernel confirms them.
pub fn rpc_trigger_collection() -> ClusterCollection {
    let chamber = ChamberId::new(Technology::Rpc, mdt_station().station);
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

/// Barrel MDT chamber for the recovery tests: stacked along global x at
/// radius 5000, wires along global z.
pub fn recovery_chamber() -> MdtChamberGeometry {
    MdtChamberGeometry {
        chamber: ChamberId::new(Technology::Mdt, StationKey::new(1, 2, 3)),
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

/// Parameters of a radial track through `recovery_chamber`, crossing one
/// tube per layer.
pub fn recovery_track_parameters() -> TrackParameters {
    let mut pars = TrackParameters::new(Vector3::new(4600.0, 6.0, 0.0), Vector3::x());
    pars.local_error = Vector2::new(0.3, 0.0);
    pars.theta_error = 0.01;
    pars
}

/// Tubes the recovery track crosses inside the drift volume, in layer
/// order.
pub fn recovery_crossed_tubes(geo: &MdtChamberGeometry) -> Vec<TubeAddress> {
    let pars = recovery_track_parameters();
    geo.tubes_crossed(pars.position, pars.direction)
        .into_iter()
        .filter(|c| c.r_intersect <= geo.inner_tube_radius)
        .map(|c| c.id.address)
        .collect()
}

/// PRD for a crossed tube with the drift radius the track would produce.
pub fn recovery_prd(geo: &MdtChamberGeometry, address: TubeAddress) -> MdtPrd {
    let surface = geo.tube_surface(address).expect("valid tube");
    let at_tube = StraightLineExtrapolator
        .to_line(&recovery_track_parameters(), &surface)
        .expect("tube reachable");
    MdtPrd {
        id: MdtTubeId::new(geo.chamber, address),
        global_position: surface.center,
        drift_radius: at_tube.local_position.x.abs(),
        drift_radius_error: 0.2,
        adc: 120,
        status: MdtStatus::InTime,
    }
}
