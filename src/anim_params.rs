//! Per-frame values an animation graph needs to pick between locomotion and climbing poses.

use crate::prelude::*;

pub(super) fn plugin(app: &mut App) {
    app.add_systems(Update, sample_anim_params);
}

/// Ground speeds up to this count as standing still.
const MOVE_SPEED_THRESHOLD: f32 = 0.05;

#[derive(Component, Clone, Copy, Reflect, Default, Debug, PartialEq)]
#[reflect(Component)]
pub struct ClimbAnimParams {
    /// Horizontal speed.
    pub ground_speed: f32,
    /// Vertical velocity.
    pub air_speed: f32,
    pub should_move: bool,
    pub is_falling: bool,
    pub is_climbing: bool,
    /// Velocity in the body's local frame.
    pub climb_velocity: Vec3,
}

impl ClimbAnimParams {
    pub fn sample(state: &ClimbState, rotation: Quat, velocity: Vec3) -> Self {
        let ground_speed = velocity.xz().length();
        let is_falling = state.is_falling();
        Self {
            ground_speed,
            air_speed: velocity.y,
            should_move: state.acceleration != Vec3::ZERO
                && ground_speed > MOVE_SPEED_THRESHOLD
                && !is_falling,
            is_falling,
            is_climbing: state.is_climbing(),
            climb_velocity: state.climb_relative_velocity(rotation, velocity),
        }
    }
}

fn sample_anim_params(
    mut climbers: Query<(
        &ClimbState,
        &Transform,
        &LinearVelocity,
        &mut ClimbAnimParams,
    )>,
) {
    for (state, transform, velocity, mut params) in &mut climbers {
        params.set_if_neq(ClimbAnimParams::sample(
            state,
            transform.rotation,
            velocity.0,
        ));
    }
}

#[cfg(test)]
mod tests {
    use core::f32::consts::FRAC_PI_2;

    use bevy_ecs::system::RunSystemOnce as _;

    use super::*;

    #[test]
    fn walking_body_should_move() {
        let state = ClimbState {
            acceleration: Vec3::NEG_Z,
            ..default()
        };
        let params = ClimbAnimParams::sample(&state, Quat::IDENTITY, vec3(3.0, -1.0, 4.0));
        assert!((params.ground_speed - 5.0).abs() < 1e-5);
        assert_eq!(params.air_speed, -1.0);
        assert!(params.should_move);
        assert!(!params.is_falling);
        assert!(!params.is_climbing);
    }

    #[test]
    fn sliding_without_input_does_not_move() {
        let state = ClimbState::default();
        let params = ClimbAnimParams::sample(&state, Quat::IDENTITY, Vec3::X);
        assert!(!params.should_move);
    }

    #[test]
    fn falling_body_does_not_move() {
        let state = ClimbState {
            mode: MovementMode::Falling,
            acceleration: Vec3::X,
            ..default()
        };
        let params = ClimbAnimParams::sample(&state, Quat::IDENTITY, Vec3::X);
        assert!(params.is_falling);
        assert!(!params.should_move);
    }

    #[test]
    fn climb_velocity_is_local() {
        let state = ClimbState {
            mode: MovementMode::Climbing,
            ..default()
        };
        let rotation = Quat::from_rotation_y(FRAC_PI_2);
        let params = ClimbAnimParams::sample(&state, rotation, rotation * Vec3::Y * 0.5);
        assert!(params.is_climbing);
        assert!(params.climb_velocity.abs_diff_eq(Vec3::Y * 0.5, 1e-5));
        assert_eq!(params.ground_speed, 0.0);
    }

    #[test]
    fn sampler_refreshes_component() {
        let mut world = World::new();
        let entity = world
            .spawn((
                ClimbState::default(),
                Transform::default(),
                LinearVelocity(Vec3::X * 2.0),
                ClimbAnimParams::default(),
            ))
            .id();
        world.run_system_once(sample_anim_params).unwrap();
        let params = world.get::<ClimbAnimParams>(entity).unwrap();
        assert_eq!(params.ground_speed, 2.0);
    }
}
