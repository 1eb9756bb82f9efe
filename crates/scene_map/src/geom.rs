//! Line-of-sight against oriented box colliders.
//!
//! Each collider is the unit cube `[-0.5, 0.5]^3` in its own frame, so the
//! test transforms the segment into that frame and runs a slab test there.

use crate::BoxCollider;
use glam::Vec3;

/// Default entry-point tolerance in metres of arc length.
pub const DEFAULT_EPS: f32 = 0.1;
/// Both endpoints are raised by this much so ground-hugging segments do not
/// clip floor colliders.
const EYE_LIFT_Y: f32 = 0.2;

/// Parametric `t` at which the segment `[p0, p1]` first enters the unit cube
/// `[-0.5, 0.5]^3`, or `None` when it misses. Axes with near-zero direction
/// require the origin to already lie inside that slab.
#[must_use]
pub fn segment_unit_cube_enter_t(p0: Vec3, p1: Vec3) -> Option<f32> {
    let d = p1 - p0;
    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;
    for i in 0..3 {
        let s = p0[i];
        let dir = d[i];
        if dir.abs() < 1e-8 {
            if !(-0.5..=0.5).contains(&s) {
                return None;
            }
        } else {
            let inv = 1.0 / dir;
            let mut t0 = (-0.5 - s) * inv;
            let mut t1 = (0.5 - s) * inv;
            if t0 > t1 {
                core::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return None;
            }
        }
    }
    Some(tmin)
}

/// True when a bot can walk straight from `from` to `to` without passing
/// through a collider. Entries whose arc length falls within `eps` of either
/// endpoint are ignored, so a bot may stand on a waypoint whose collider
/// grazes the segment terminus.
#[must_use]
pub fn is_path_clear(from: Vec3, to: Vec3, colliders: &[BoxCollider], eps: f32) -> bool {
    let lift = Vec3::new(0.0, EYE_LIFT_Y, 0.0);
    let a = from + lift;
    let b = to + lift;
    let len = (b - a).length();
    if len <= 2.0 * eps {
        return true;
    }
    for c in colliders {
        let la = c.inv_world.transform_point3(a);
        let lb = c.inv_world.transform_point3(b);
        if let Some(t) = segment_unit_cube_enter_t(la, lb) {
            let enter_len = t * len;
            if enter_len > eps && enter_len < len - eps {
                log::debug!("path blocked by collider '{}' at t={t:.3}", c.name);
                return false;
            }
        }
    }
    true
}
