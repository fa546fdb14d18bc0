//! Small geometry kernel shared by the weighting, segment-finding and
//! hole-recovery stages: lines in normal form, common tangents to drift
//! circles, and the bounded surfaces extrapolation targets.

use nalgebra::{Isometry3, Point3, Unit, Vector2, Vector3};

/// Line in normal form `n·p + c = 0` with `|n| = 1`.
#[derive(Clone, Copy, Debug)]
pub struct Line2 {
    pub normal: Vector2<f64>,
    pub offset: f64,
}

impl Line2 {
    pub fn new(normal: Vector2<f64>, offset: f64) -> Self {
        Self { normal, offset }
    }

    /// Signed perpendicular distance of `p` from the line.
    pub fn signed_distance(&self, p: Vector2<f64>) -> f64 {
        self.normal.dot(&p) + self.offset
    }

    /// Unit tangent, oriented so that `tangent·hint > 0` when `hint` is not
    /// perpendicular to the line.
    pub fn tangent(&self, hint: Vector2<f64>) -> Vector2<f64> {
        let t = Vector2::new(-self.normal.y, self.normal.x);
        if t.dot(&hint) < 0.0 {
            -t
        } else {
            t
        }
    }
}

/// Circle in the drift plane: wire position plus drift radius.
#[derive(Clone, Copy, Debug)]
pub struct Circle2 {
    pub center: Vector2<f64>,
    pub radius: f64,
}

impl Circle2 {
    pub fn new(center: Vector2<f64>, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// Common tangent lines to two drift circles.
///
/// Each circle contributes a left/right sign ambiguity, giving up to four
/// distinct lines (two external, two internal). Degenerate configurations
/// (concentric circles, separation smaller than the radius difference)
/// yield fewer candidates.
pub fn tangent_lines(a: &Circle2, b: &Circle2) -> Vec<Line2> {
    let d = b.center - a.center;
    let dist = d.norm();
    let mut lines = Vec::with_capacity(4);
    if dist < 1e-9 {
        return lines;
    }
    let dir = d / dist;

    // Sign pairs (s_a, s_b) satisfying n·p + c = s*r on both circles.
    // (+,+) gives the external tangents, (+,-) the internal ones; the
    // remaining combinations mirror these and describe the same lines.
    for (sa, sb) in [(1.0f64, 1.0f64), (1.0, -1.0)] {
        let dr = sb * b.radius - sa * a.radius;
        let cos_alpha = dr / dist;
        if cos_alpha.abs() > 1.0 {
            continue;
        }
        let sin_alpha = (1.0 - cos_alpha * cos_alpha).sqrt();
        for sign in [1.0f64, -1.0] {
            // Unit normal at angle ±alpha to the centre line.
            let normal = Vector2::new(
                dir.x * cos_alpha - sign * dir.y * sin_alpha,
                dir.y * cos_alpha + sign * dir.x * sin_alpha,
            );
            let offset = sa * a.radius - normal.dot(&a.center);
            lines.push(Line2::new(normal, offset));
        }
    }
    lines
}

/// Bounded rectangular plane. The local frame has x/y in the plane and z
/// along the normal; `transform` maps local to global.
#[derive(Clone, Debug)]
pub struct PlaneSurface {
    pub transform: Isometry3<f64>,
    /// Half-lengths along local x and y.
    pub half_bounds: Vector2<f64>,
}

impl PlaneSurface {
    pub fn new(transform: Isometry3<f64>, half_bounds: Vector2<f64>) -> Self {
        Self {
            transform,
            half_bounds,
        }
    }

    pub fn center(&self) -> Vector3<f64> {
        self.transform.translation.vector
    }

    /// Plane normal in global coordinates.
    pub fn normal(&self) -> Vector3<f64> {
        self.transform * Vector3::z()
    }

    pub fn to_local(&self, global: Vector3<f64>) -> Vector3<f64> {
        self.transform
            .inverse_transform_point(&Point3::from(global))
            .coords
    }

    pub fn to_global(&self, local: Vector3<f64>) -> Vector3<f64> {
        (self.transform * Point3::from(local)).coords
    }

    /// Bounds check with a tolerance added on both half-lengths.
    pub fn inside(&self, local: Vector2<f64>, tolerance: f64) -> bool {
        local.x.abs() <= self.half_bounds.x + tolerance
            && local.y.abs() <= self.half_bounds.y + tolerance
    }
}

/// Straight-line surface, the anode wire of a drift tube.
#[derive(Clone, Debug)]
pub struct LineSurface {
    pub center: Vector3<f64>,
    pub direction: Unit<Vector3<f64>>,
    /// Half-length of the active wire.
    pub half_length: f64,
}

impl LineSurface {
    pub fn new(center: Vector3<f64>, direction: Unit<Vector3<f64>>, half_length: f64) -> Self {
        Self {
            center,
            direction,
            half_length,
        }
    }
}
