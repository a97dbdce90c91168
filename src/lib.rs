#![doc = include_str!("../readme.md")]

/// Everything you need to get started with `bevy_climb`
pub mod prelude {
    pub(crate) use {
        avian3d::prelude::*,
        bevy_app::prelude::*,
        bevy_derive::{Deref, DerefMut},
        bevy_ecs::prelude::*,
        bevy_enhanced_input::prelude::*,
        bevy_math::prelude::*,
        bevy_reflect::prelude::*,
        bevy_time::prelude::*,
        bevy_transform::prelude::*,
        bevy_utils::prelude::*,
    };

    pub use crate::{
        ClimbController, ClimbPlugin, ClimbState, ClimbSystems, MovementMode,
        anim_params::ClimbAnimParams,
        cue::{
            AnimationCue, ClimbCueEnded, ClimbCues, CueKind, CuePlayback, MotionWarpTargets,
            PlayClimbCue, RootMotion,
        },
        input::{Climb, Movement},
        mode::{ClimbModeChanged, ToggleClimb},
        probe::{AvianProbe, BodyMover, GeometryProbe, ProbeHit},
        surface::SurfaceEstimate,
    };
}

use crate::{input::AccumulatedInput, prelude::*};
use avian3d::parry::shape::{Capsule, SharedShape};
use bevy_ecs::{
    intern::Interned, lifecycle::HookContext, schedule::ScheduleLabel, world::DeferredWorld,
};
use std::sync::Arc;

pub mod anim_params;
mod climb;
pub mod cue;
pub mod decision;
mod fixed_tick;
pub mod input;
pub mod mode;
pub mod probe;
pub mod surface;

/// Also requires you to add [`PhysicsPlugins`] and [`EnhancedInputPlugin`] to work properly.
pub struct ClimbPlugin {
    schedule: Interned<dyn ScheduleLabel>,
}

impl ClimbPlugin {
    /// Create a new plugin in the given schedule. The default is [`FixedPostUpdate`].
    pub fn new(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Default for ClimbPlugin {
    fn default() -> Self {
        Self {
            schedule: FixedPostUpdate.intern(),
        }
    }
}

impl Plugin for ClimbPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            self.schedule,
            ClimbSystems::MoveClimbers.in_set(PhysicsSystems::First),
        )
        .add_plugins((
            input::plugin,
            climb::plugin(self.schedule),
            mode::plugin,
            cue::plugin,
            anim_params::plugin,
            fixed_tick::plugin,
        ));
    }
}

/// System set used by all systems of `bevy_climb`.
#[derive(SystemSet, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ClimbSystems {
    MoveClimbers,
}

/// Climbing thresholds and tuning. Distances are in meters, angles in degrees.
///
/// Treated as read-only once the entity is spawned.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(
    AccumulatedInput,
    ClimbState,
    ClimbCues,
    CuePlayback,
    MotionWarpTargets,
    RootMotion,
    ClimbAnimParams,
    TranslationInterpolation,
    RigidBody = RigidBody::Kinematic,
    Collider = Collider::capsule(0.42, 1.08),
    CustomPositionIntegration,
    LinearVelocity,
    Transform,
    SpeculativeMargin::ZERO,
)]
#[component(on_add=ClimbController::on_add)]
pub struct ClimbController {
    /// Surfaces the character can grab. Every climbing probe uses this filter.
    pub climbable: SpatialQueryFilter,
    /// Filter for moving the body itself.
    pub filter: SpatialQueryFilter,
    pub move_and_slide: MoveAndSlideConfig,
    pub capsule_trace_radius: f32,
    pub capsule_trace_half_height: f32,
    /// How far ahead of the body the climb surface sweep starts.
    pub surface_trace_offset: f32,
    pub eye_height: f32,
    pub eye_trace_distance: f32,
    pub climbing_friction: f32,
    pub max_brake_deceleration: f32,
    pub max_climb_acceleration: f32,
    pub max_climb_speed: f32,
    /// Rate at which the body turns to face the wall, per second.
    pub climb_rotation_speed: f32,
    /// Surfaces whose normal is within this angle of up stop the climb.
    pub stop_climbing_angle: f32,
    /// Floor hits whose normal is within this angle of up end a downward climb.
    pub floor_angle: f32,
    pub floor_trace_offset: f32,
    /// Vertical climb speed that has to be exceeded before floors and ledges are accepted.
    pub exit_vertical_speed: f32,
    pub ledge_trace_offset: f32,
    pub ledge_trace_distance: f32,
    pub ledge_drop_distance: f32,
    pub descend_reach: f32,
    pub descend_drop: f32,
    pub descend_grab: f32,
    pub vault_trace_height: f32,
    pub vault_step: f32,
    pub vault_max_distance: f32,
    pub vault_surface_depth: f32,
    pub vault_floor_depth: f32,
    /// Collider height while on a wall.
    pub climbing_height: f32,
    /// Rate of the pull toward the wall, per meter of gap, before scaling by climb speed.
    pub surface_snap_rate: f32,
    pub walk_speed: f32,
    pub walk_acceleration: f32,
    pub ground_friction: f32,
    pub walk_brake_deceleration: f32,
    /// Fraction of the walk acceleration available while falling.
    pub air_control: f32,
    pub gravity: f32,
    /// Rising faster than this never counts as grounded.
    pub unground_speed: f32,
    pub ground_distance: f32,
    pub min_walk_cos: f32,
    /// Ticks shorter than this are skipped.
    pub min_tick_time: f32,
}

impl Default for ClimbController {
    fn default() -> Self {
        Self {
            climbable: SpatialQueryFilter::default(),
            filter: SpatialQueryFilter::default(),
            move_and_slide: MoveAndSlideConfig {
                skin_width: 0.0075,
                ..default()
            },
            capsule_trace_radius: 0.5,
            capsule_trace_half_height: 0.725,
            surface_trace_offset: 0.3,
            eye_height: 0.64,
            eye_trace_distance: 1.0,
            climbing_friction: 0.0,
            max_brake_deceleration: 4.0,
            max_climb_acceleration: 3.0,
            max_climb_speed: 1.0,
            climb_rotation_speed: 5.0,
            stop_climbing_angle: 60.0,
            floor_angle: 10.0,
            floor_trace_offset: 0.5,
            exit_vertical_speed: 0.1,
            ledge_trace_offset: 0.8,
            ledge_trace_distance: 1.0,
            ledge_drop_distance: 1.0,
            descend_reach: 0.5,
            descend_drop: 4.0,
            descend_grab: 0.75,
            vault_trace_height: 1.0,
            vault_step: 1.0,
            vault_max_distance: 5.0,
            vault_surface_depth: 1.0,
            vault_floor_depth: 3.0,
            climbing_height: 0.96,
            surface_snap_rate: 100.0,
            walk_speed: 5.0,
            walk_acceleration: 20.48,
            ground_friction: 8.0,
            walk_brake_deceleration: 20.48,
            air_control: 0.05,
            gravity: 9.8,
            unground_speed: 2.5,
            ground_distance: 0.05,
            min_walk_cos: 0.766,
            min_tick_time: 1e-6,
        }
    }
}

impl ClimbController {
    pub fn on_add(mut world: DeferredWorld, ctx: HookContext) {
        {
            let Some(mut cfg) = world.get_mut::<Self>(ctx.entity) else {
                return;
            };
            cfg.filter.excluded_entities.insert(ctx.entity);
            cfg.climbable.excluded_entities.insert(ctx.entity);
        }

        let climbing_height = {
            let Some(cfg) = world.get::<Self>(ctx.entity) else {
                return;
            };
            cfg.climbing_height
        };

        let Some(collider) = world.entity(ctx.entity).get::<Collider>().cloned() else {
            return;
        };
        let standing_aabb = collider.aabb(default(), Rotation::default());
        let standing_height = standing_aabb.max.y - standing_aabb.min.y;

        let Some(mut state) = world.get_mut::<ClimbState>(ctx.entity) else {
            return;
        };
        state.standing_collider = collider.clone();

        let mut climbing_collider = Collider::from(SharedShape(Arc::from(
            state.standing_collider.shape().clone_dyn(),
        )));
        // Shrink around the center so the body stays against the wall it was probed from.
        if climbing_collider.shape().as_capsule().is_some() {
            if let Some(capsule) = climbing_collider
                .shape_mut()
                .make_mut()
                .as_capsule_mut()
            {
                let radius = capsule.radius;
                let half_segment = (climbing_height / 2.0 - radius).max(0.0);
                *capsule = Capsule::new_y(half_segment, radius);
            }
        } else if standing_height > 0.0 {
            climbing_collider.set_scale(vec3(1.0, climbing_height / standing_height, 1.0), 16);
        }
        state.climbing_collider = climbing_collider;
    }

    /// Max speed for the given mode.
    pub fn max_speed(&self, mode: MovementMode) -> f32 {
        if mode.is_climbing() {
            self.max_climb_speed
        } else {
            self.walk_speed
        }
    }

    /// Max acceleration for the given mode.
    pub fn max_acceleration(&self, mode: MovementMode) -> f32 {
        if mode.is_climbing() {
            self.max_climb_acceleration
        } else {
            self.walk_acceleration
        }
    }
}

/// Locomotion mode of a climbing character. Exactly one is active at a time.
#[derive(Clone, Copy, Reflect, Default, Debug, PartialEq, Eq, Hash)]
pub enum MovementMode {
    #[default]
    Grounded,
    Falling,
    Climbing,
    /// The idle-to-climb cue is playing; becomes [`MovementMode::Climbing`] when it ends.
    EnteringClimb,
    /// The idle-to-ledge cue is playing; becomes [`MovementMode::Climbing`] when it ends.
    EnteringLedge,
    /// Root-motion driven vault. Counts as climbing.
    Vaulting,
}

impl MovementMode {
    pub fn is_climbing(self) -> bool {
        matches!(self, Self::Climbing | Self::Vaulting)
    }

    /// Any mode the climb toggle can switch off.
    pub fn is_climb_related(self) -> bool {
        matches!(
            self,
            Self::Climbing | Self::Vaulting | Self::EnteringClimb | Self::EnteringLedge
        )
    }
}

#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
pub struct ClimbState {
    pub mode: MovementMode,
    /// Hits of the latest climb surface sweep.
    pub hits: Vec<ProbeHit>,
    pub surface: SurfaceEstimate,
    /// Whether the host should turn the body toward its movement direction.
    pub orient_rotation_to_movement: bool,
    /// Input acceleration applied during the last tick.
    pub acceleration: Vec3,
    #[reflect(ignore)]
    pub standing_collider: Collider,
    #[reflect(ignore)]
    pub climbing_collider: Collider,
}

impl Default for ClimbState {
    fn default() -> Self {
        Self {
            mode: MovementMode::default(),
            hits: Vec::new(),
            surface: SurfaceEstimate::default(),
            orient_rotation_to_movement: true,
            acceleration: Vec3::ZERO,
            standing_collider: Collider::default(),
            climbing_collider: Collider::default(),
        }
    }
}

impl ClimbState {
    pub fn is_climbing(&self) -> bool {
        self.mode.is_climbing()
    }

    pub fn is_falling(&self) -> bool {
        self.mode == MovementMode::Falling
    }

    /// Averaged normal of the wall being climbed, or zero when there is none.
    pub fn surface_normal(&self) -> Vec3 {
        self.surface.normal
    }

    /// Velocity expressed in the body's local frame.
    pub fn climb_relative_velocity(&self, rotation: Quat, velocity: Vec3) -> Vec3 {
        rotation.inverse() * velocity
    }

    pub fn collider(&self) -> &Collider {
        if self.mode.is_climbing() {
            &self.climbing_collider
        } else {
            &self.standing_collider
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn climbing_family() {
        assert!(MovementMode::Climbing.is_climbing());
        assert!(MovementMode::Vaulting.is_climbing());
        assert!(!MovementMode::EnteringClimb.is_climbing());
        assert!(MovementMode::EnteringLedge.is_climb_related());
        assert!(!MovementMode::Falling.is_climb_related());
        assert!(!MovementMode::Grounded.is_climb_related());
    }

    #[test]
    fn max_speed_and_acceleration_follow_mode() {
        let cfg = ClimbController::default();
        assert_eq!(cfg.max_speed(MovementMode::Climbing), cfg.max_climb_speed);
        assert_eq!(cfg.max_speed(MovementMode::Grounded), cfg.walk_speed);
        assert_eq!(
            cfg.max_acceleration(MovementMode::Vaulting),
            cfg.max_climb_acceleration
        );
        assert_eq!(
            cfg.max_acceleration(MovementMode::Falling),
            cfg.walk_acceleration
        );
    }

    #[test]
    fn relative_velocity_removes_body_rotation() {
        let state = ClimbState::default();
        let rotation = Quat::from_rotation_y(core::f32::consts::FRAC_PI_2);
        let world_velocity = rotation * vec3(0.0, 0.5, -1.0);
        let local = state.climb_relative_velocity(rotation, world_velocity);
        assert!(local.abs_diff_eq(vec3(0.0, 0.5, -1.0), 1e-5));
    }
}
