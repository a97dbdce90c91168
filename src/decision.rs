//! Geometric verdicts that drive the climb mode transitions.
//!
//! Every function here is state-independent: it only looks at fresh probe results and
//! the body's current kinematics, so the same world always yields the same verdict.

use tracing::trace;

use crate::{
    prelude::*,
    probe::{GeometryProbe, ProbeHit},
};

/// Length of the "sweeps" used as overlap checks.
const NUDGE: f32 = 0.01;

/// Snapshot of the body the verdicts are evaluated against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyPose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub falling: bool,
}

impl BodyPose {
    pub fn new(transform: &Transform, velocity: Vec3, falling: bool) -> Self {
        Self {
            translation: transform.translation,
            rotation: transform.rotation,
            velocity,
            falling,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Velocity in the body's unrotated frame.
    pub fn relative_velocity(&self) -> Vec3 {
        self.rotation.inverse() * self.velocity
    }
}

/// Start and land anchors of a feasible vault.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VaultPlan {
    pub start: Vec3,
    pub end: Vec3,
}

/// Angle between `normal` and world up, in degrees. A zero normal measures 90°.
pub fn angle_from_up(normal: Vec3) -> f32 {
    normal.dot(Vec3::Y).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Capsule sweep just ahead of the body. Its hits are the climbable surfaces in reach.
pub fn trace_climb_surfaces(
    probe: &impl GeometryProbe,
    pose: &BodyPose,
    cfg: &ClimbController,
) -> Vec<ProbeHit> {
    let forward = pose.forward();
    let start = pose.translation + forward * cfg.surface_trace_offset;
    let end = start + forward * NUDGE;
    probe.sweep_capsule(
        start,
        end,
        cfg.capsule_trace_radius,
        cfg.capsule_trace_half_height,
    )
}

/// Ray straight ahead from eye height, raised by `offset`.
pub fn trace_from_eyes(
    probe: &impl GeometryProbe,
    pose: &BodyPose,
    cfg: &ClimbController,
    distance: f32,
    offset: f32,
) -> ProbeHit {
    let start = pose.translation + pose.up() * (cfg.eye_height + offset);
    let end = start + pose.forward() * distance;
    probe.trace_ray(start, end)
}

/// Returns the climb surface hits when a climb can start, `None` otherwise.
pub fn can_start_climbing(
    probe: &impl GeometryProbe,
    pose: &BodyPose,
    cfg: &ClimbController,
) -> Option<Vec<ProbeHit>> {
    let hits = trace_climb_surfaces(probe, pose, cfg);
    if hits.is_empty() {
        return None;
    }
    if !trace_from_eyes(probe, pose, cfg, cfg.eye_trace_distance, 0.0).blocking {
        return None;
    }
    (!pose.falling).then_some(hits)
}

/// Open space ahead, a drop beyond it, and a wall to hold on the way down.
pub fn can_start_descending(
    probe: &impl GeometryProbe,
    pose: &BodyPose,
    cfg: &ClimbController,
) -> bool {
    if pose.falling {
        return false;
    }
    let ahead = trace_from_eyes(probe, pose, cfg, cfg.descend_reach, 0.0);
    if ahead.blocking {
        return false;
    }
    let down = -pose.up();
    let drop = probe.trace_ray(ahead.end, ahead.end + down * cfg.descend_drop);
    if drop.blocking {
        return false;
    }
    let back = probe.trace_ray(drop.end, drop.end - pose.forward() * cfg.descend_grab);
    back.blocking
}

/// Steps forward looking for an obstacle top to vault from and a floor to land on.
///
/// The first step must find both the obstacle top and the floor below it. Every later
/// step lands on the first spot where the obstacle is gone but the floor is still there.
/// A later step that finds neither obstacle nor floor keeps searching.
pub fn can_vault(
    probe: &impl GeometryProbe,
    pose: &BodyPose,
    cfg: &ClimbController,
) -> Option<VaultPlan> {
    if pose.falling || cfg.vault_step <= 0.0 {
        return None;
    }
    let forward = pose.forward();
    let up = pose.up();
    let steps = (cfg.vault_max_distance / cfg.vault_step).floor() as u32;

    let mut start = None;
    for step in 1..=steps {
        let origin =
            pose.translation + up * cfg.vault_trace_height + forward * cfg.vault_step * step as f32;
        let surface = probe.trace_ray(origin, origin - up * cfg.vault_surface_depth);
        let floor = probe.trace_ray(origin, origin - up * cfg.vault_floor_depth);
        trace!(
            "vault step {step}: surface {} floor {}",
            surface.blocking, floor.blocking
        );

        match start {
            None => {
                if !(surface.blocking && floor.blocking) {
                    return None;
                }
                start = Some(surface.point);
            }
            Some(start) => {
                if !surface.blocking && floor.blocking {
                    return Some(VaultPlan {
                        start,
                        end: floor.point,
                    });
                }
            }
        }
    }
    None
}

/// Whether the current wall is gone or too flat to keep climbing.
pub fn should_stop_climbing(hits: &[ProbeHit], normal: Vec3, cfg: &ClimbController) -> bool {
    hits.is_empty() || angle_from_up(normal) <= cfg.stop_climbing_angle
}

/// Whether a floor is right below a body that is climbing down.
pub fn is_floor_reached(probe: &impl GeometryProbe, pose: &BodyPose, cfg: &ClimbController) -> bool {
    if pose.relative_velocity().y >= -cfg.exit_vertical_speed {
        return false;
    }
    let down = -pose.up();
    let start = pose.translation + down * cfg.floor_trace_offset;
    let end = start + down * NUDGE;
    probe
        .sweep_capsule(
            start,
            end,
            cfg.capsule_trace_radius,
            cfg.capsule_trace_half_height,
        )
        .iter()
        .any(|hit| angle_from_up(hit.normal) <= cfg.floor_angle)
}

/// Whether a body climbing up has open space at eye level and ground above the wall.
pub fn is_ledge_reached(probe: &impl GeometryProbe, pose: &BodyPose, cfg: &ClimbController) -> bool {
    if pose.relative_velocity().y <= cfg.exit_vertical_speed {
        return false;
    }
    let ahead = trace_from_eyes(
        probe,
        pose,
        cfg,
        cfg.ledge_trace_distance,
        cfg.ledge_trace_offset,
    );
    if ahead.blocking {
        return false;
    }
    let down = -pose.up();
    probe
        .trace_ray(ahead.end, ahead.end + down * cfg.ledge_drop_distance)
        .blocking
}
