use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};
use tracing::{trace, warn};

use crate::{
    cue::{ClimbCues, CueKind, CuePlayback, RootMotion},
    decision::{
        BodyPose, is_floor_reached, is_ledge_reached, should_stop_climbing, trace_climb_surfaces,
    },
    input::AccumulatedInput,
    mode::transition,
    prelude::*,
    probe::{AvianProbe, BodyHit, BodyMover, GeometryProbe},
    surface::{SurfaceEstimate, aggregate},
};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(schedule, run_climbers.in_set(ClimbSystems::MoveClimbers));
    }
}

/// Speeds below this are treated as standing still while braking.
const BRAKE_TO_STOP_SPEED: f32 = 0.1;

#[derive(Debug)]
struct Ctx<'a> {
    cfg: &'a ClimbController,
    input: Vec2,
    /// Root-motion velocity overriding the computed velocity and rotation.
    root_motion: Option<Vec3>,
    dt: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClimbStep {
    /// Tick too short to integrate.
    Skipped,
    Moved,
    Stopped,
    LedgeReached,
}

#[derive(Clone, Copy, Debug)]
struct Braking {
    friction: f32,
    deceleration: f32,
}

/// Components of one climber, borrowed for a tick.
struct Body<'a> {
    entity: Entity,
    state: &'a mut ClimbState,
    cues: &'a ClimbCues,
    playback: &'a mut CuePlayback,
    transform: &'a mut Transform,
    velocity: &'a mut Vec3,
}

fn run_climbers(
    mut commands: Commands,
    mut climbers: Query<(
        Entity,
        &ClimbController,
        &mut ClimbState,
        &AccumulatedInput,
        &RootMotion,
        &ClimbCues,
        &mut CuePlayback,
        &mut Transform,
        &mut LinearVelocity,
    )>,
    time: Res<Time>,
    move_and_slide: MoveAndSlide,
) {
    for (
        entity,
        cfg,
        mut state,
        input,
        root_motion,
        cues,
        mut playback,
        mut transform,
        mut velocity,
    ) in &mut climbers
    {
        let ctx = Ctx {
            cfg,
            input: input.last_movement.unwrap_or_default(),
            root_motion: root_motion.constrained(state.mode, playback.is_playing(), velocity.0),
            dt: time.delta_secs(),
        };
        let collider = state.collider().clone();
        let geometry = AvianProbe {
            move_and_slide: &move_and_slide,
            body: &collider,
            cfg,
        };
        tick(
            &geometry,
            &mut commands,
            Body {
                entity,
                state: &mut state,
                cues,
                playback: &mut playback,
                transform: &mut transform,
                velocity: &mut velocity.0,
            },
            &ctx,
        );
    }
}

/// Advances one body by a tick of its current mode and applies the resulting transition.
fn tick(world: &(impl GeometryProbe + BodyMover), commands: &mut Commands, body: Body, ctx: &Ctx) {
    let Body {
        entity,
        state,
        cues,
        playback,
        transform,
        velocity,
    } = body;
    match state.mode {
        MovementMode::Climbing => match climb_tick(world, transform, velocity, state, ctx) {
            ClimbStep::Stopped => {
                transition(commands, entity, state, transform, velocity, MovementMode::Falling);
            }
            ClimbStep::LedgeReached => {
                playback.play(commands, entity, cues.get(CueKind::ClimbToLedge));
                transition(commands, entity, state, transform, velocity, MovementMode::Falling);
            }
            ClimbStep::Skipped | ClimbStep::Moved => {}
        },
        MovementMode::Grounded | MovementMode::Falling => {
            let next = walk_tick(world, transform, velocity, state, ctx);
            transition(commands, entity, state, transform, velocity, next);
        }
        MovementMode::EnteringClimb | MovementMode::EnteringLedge | MovementMode::Vaulting => {
            state.acceleration = Vec3::ZERO;
            if let Some(root) = ctx.root_motion {
                root_motion_move(world, transform, velocity, root, ctx);
            }
        }
    }
}

fn climb_tick(
    world: &(impl GeometryProbe + BodyMover),
    transform: &mut Transform,
    velocity: &mut Vec3,
    state: &mut ClimbState,
    ctx: &Ctx,
) -> ClimbStep {
    if ctx.dt < ctx.cfg.min_tick_time {
        return ClimbStep::Skipped;
    }
    depenetrate(world, transform);

    let pose = BodyPose::new(transform, *velocity, false);
    state.hits = trace_climb_surfaces(world, &pose, ctx.cfg);
    state.surface = aggregate(&state.hits);
    if should_stop_climbing(&state.hits, state.surface.normal, ctx.cfg)
        || is_floor_reached(world, &pose, ctx.cfg)
    {
        return ClimbStep::Stopped;
    }

    state.acceleration = climb_acceleration(
        ctx.input,
        state.surface.normal,
        transform.rotation,
        ctx.cfg,
    );
    let max_speed = ctx.cfg.max_speed(state.mode);
    match ctx.root_motion {
        Some(root) => {
            *velocity = root;
            validate_velocity(velocity, f32::INFINITY);
        }
        None => {
            let braking = Braking {
                friction: ctx.cfg.climbing_friction,
                deceleration: ctx.cfg.max_brake_deceleration,
            };
            calc_velocity(velocity, state.acceleration, max_speed, braking, ctx.dt);
            validate_velocity(velocity, max_speed);
        }
    }

    let old_position = transform.translation;
    transform.rotation = climb_rotation(transform.rotation, state.surface.normal, ctx);
    slide_move(world, transform, *velocity * ctx.dt);
    if ctx.root_motion.is_none() {
        *velocity = (transform.translation - old_position) / ctx.dt;
    }

    let snap = snap_offset(transform, &state.surface, ctx.dt, ctx.cfg);
    sweep_move(world, transform, snap);

    let pose = BodyPose::new(transform, *velocity, false);
    if is_ledge_reached(world, &pose, ctx.cfg) {
        return ClimbStep::LedgeReached;
    }
    ClimbStep::Moved
}

/// Walking and falling. Returns the mode the body ends up in.
fn walk_tick(
    world: &impl BodyMover,
    transform: &mut Transform,
    velocity: &mut Vec3,
    state: &mut ClimbState,
    ctx: &Ctx,
) -> MovementMode {
    let mode = state.mode;
    state.acceleration = walk_acceleration(transform, mode, ctx);
    if ctx.dt < ctx.cfg.min_tick_time {
        return mode;
    }
    depenetrate(world, transform);

    if let Some(root) = ctx.root_motion {
        root_motion_move(world, transform, velocity, root, ctx);
    } else {
        let grounded = mode == MovementMode::Grounded;
        let (acceleration, braking) = if grounded {
            (
                state.acceleration,
                Braking {
                    friction: ctx.cfg.ground_friction,
                    deceleration: ctx.cfg.walk_brake_deceleration,
                },
            )
        } else {
            (
                state.acceleration * ctx.cfg.air_control,
                Braking {
                    friction: 0.0,
                    deceleration: 0.0,
                },
            )
        };

        if !grounded {
            start_gravity(velocity, ctx);
        }
        let mut planar = velocity.with_y(0.0);
        calc_velocity(
            &mut planar,
            acceleration,
            ctx.cfg.max_speed(mode),
            braking,
            ctx.dt,
        );
        *velocity = planar.with_y(if grounded { 0.0 } else { velocity.y });
        validate_velocity(velocity, f32::INFINITY);

        if let Some(hit) = slide_move(world, transform, *velocity * ctx.dt) {
            // Lose the part of the velocity that went into the obstacle.
            *velocity -= hit.normal * velocity.dot(hit.normal).min(0.0);
        }
        if !grounded {
            finish_gravity(velocity, ctx);
        }
    }

    if is_grounded(world, transform, *velocity, ctx) {
        velocity.y = velocity.y.max(0.0);
        MovementMode::Grounded
    } else {
        MovementMode::Falling
    }
}

fn start_gravity(velocity: &mut Vec3, ctx: &Ctx) {
    velocity.y -= ctx.cfg.gravity * 0.5 * ctx.dt;
}

fn finish_gravity(velocity: &mut Vec3, ctx: &Ctx) {
    velocity.y -= ctx.cfg.gravity * 0.5 * ctx.dt;
    validate_velocity(velocity, f32::INFINITY);
}

fn depenetrate(world: &impl BodyMover, transform: &mut Transform) {
    transform.translation += world.depenetrate(transform.translation, transform.rotation);
}

/// Input mapped onto the wall: stick up climbs along the wall, stick right moves sideways.
fn climb_acceleration(input: Vec2, normal: Vec3, rotation: Quat, cfg: &ClimbController) -> Vec3 {
    let up_the_wall = normal.cross(rotation * Vec3::X);
    let along_the_wall = (rotation * Vec3::Y).cross(normal);
    let input = input.clamp_length_max(1.0);
    (up_the_wall * input.y + along_the_wall * input.x) * cfg.max_climb_acceleration
}

/// Horizontal input acceleration for walking and falling, relative to the body's heading.
fn walk_acceleration(transform: &Transform, mode: MovementMode, ctx: &Ctx) -> Vec3 {
    let mut forward = Vec3::from(transform.forward());
    forward.y = 0.0;
    let mut right = Vec3::from(transform.right());
    right.y = 0.0;
    let input = ctx.input.clamp_length_max(1.0);
    let wish = input.y * forward.normalize_or_zero() + input.x * right.normalize_or_zero();
    wish * ctx.cfg.max_acceleration(mode)
}

fn calc_velocity(
    velocity: &mut Vec3,
    acceleration: Vec3,
    max_speed: f32,
    braking: Braking,
    dt: f32,
) {
    let zero_acceleration = acceleration == Vec3::ZERO;
    let exceeding_max_speed = velocity.length_squared() > max_speed * max_speed;

    if zero_acceleration || exceeding_max_speed {
        let old_velocity = *velocity;
        apply_braking(velocity, braking, dt);
        // Don't brake below max speed while still pushing in the direction of travel.
        if exceeding_max_speed
            && velocity.length_squared() < max_speed * max_speed
            && acceleration.dot(old_velocity) > 0.0
        {
            *velocity = old_velocity.normalize_or_zero() * max_speed;
        }
    } else {
        // Friction steers the velocity toward the input direction.
        let speed = velocity.length();
        let direction = acceleration.normalize_or_zero();
        *velocity -= (*velocity - direction * speed) * (dt * braking.friction).min(1.0);
    }

    if !zero_acceleration {
        let speed_cap = if velocity.length_squared() > max_speed * max_speed {
            velocity.length()
        } else {
            max_speed
        };
        *velocity += acceleration * dt;
        *velocity = velocity.clamp_length_max(speed_cap);
    }
}

fn apply_braking(velocity: &mut Vec3, braking: Braking, dt: f32) {
    if *velocity == Vec3::ZERO || (braking.deceleration == 0.0 && braking.friction == 0.0) {
        return;
    }
    let old_velocity = *velocity;
    let reverse = -old_velocity.normalize_or_zero() * braking.deceleration;
    *velocity += (-braking.friction * old_velocity + reverse) * dt;

    // Braking never reverses the direction of travel.
    if velocity.dot(old_velocity) <= 0.0
        || velocity.length_squared() < BRAKE_TO_STOP_SPEED * BRAKE_TO_STOP_SPEED
    {
        *velocity = Vec3::ZERO;
    }
}

fn validate_velocity(velocity: &mut Vec3, max_speed: f32) {
    for i in 0..3 {
        if !velocity[i].is_finite() {
            warn!("velocity[{i}] is not finite: {}, setting to 0", velocity[i]);
            velocity[i] = 0.0;
        }
    }
    *velocity = velocity.clamp_length(0.0, max_speed);
}

/// Turns the body to face into the wall, unless root motion owns the rotation.
fn climb_rotation(current: Quat, normal: Vec3, ctx: &Ctx) -> Quat {
    if ctx.root_motion.is_some() || normal == Vec3::ZERO {
        return current;
    }
    let target = Transform::default().looking_to(-normal, Vec3::Y).rotation;
    let alpha = (ctx.dt * ctx.cfg.climb_rotation_speed).clamp(0.0, 1.0);
    current.slerp(target, alpha)
}

/// Pulls the body toward the wall by the forward distance to it, scaled by the tick.
fn snap_offset(
    transform: &Transform,
    surface: &SurfaceEstimate,
    dt: f32,
    cfg: &ClimbController,
) -> Vec3 {
    let forward = Vec3::from(transform.forward());
    let to_surface = surface.point - transform.translation;
    let distance = to_surface.project_onto_normalized(forward).length();
    -surface.normal * distance * dt * cfg.max_climb_speed * cfg.surface_snap_rate
}

/// Sweeps the body by `displacement` and stops at the first contact.
fn sweep_move(world: &impl BodyMover, transform: &mut Transform, displacement: Vec3) -> Option<BodyHit> {
    if displacement == Vec3::ZERO {
        return None;
    }
    let hit = world.sweep_body(transform.translation, transform.rotation, displacement);
    let time = hit.map_or(1.0, |hit| hit.time);
    transform.translation += displacement * time;
    hit
}

/// Moves by `displacement` and slides the remainder along the surface that blocked it.
/// Returns the blocking contact, if any.
fn slide_move(world: &impl BodyMover, transform: &mut Transform, displacement: Vec3) -> Option<BodyHit> {
    let hit = sweep_move(world, transform, displacement)?;
    trace!("move blocked at {:.2}, normal {}", hit.time, hit.normal);
    let remaining = displacement * (1.0 - hit.time);
    let slide = remaining - hit.normal * remaining.dot(hit.normal);
    if slide.length_squared() > f32::EPSILON {
        sweep_move(world, transform, slide);
    }
    Some(hit)
}

fn root_motion_move(
    world: &impl BodyMover,
    transform: &mut Transform,
    velocity: &mut Vec3,
    root: Vec3,
    ctx: &Ctx,
) {
    if ctx.dt < ctx.cfg.min_tick_time {
        return;
    }
    *velocity = root;
    validate_velocity(velocity, f32::INFINITY);
    slide_move(world, transform, *velocity * ctx.dt);
}

fn is_grounded(world: &impl BodyMover, transform: &Transform, velocity: Vec3, ctx: &Ctx) -> bool {
    if velocity.y > ctx.cfg.unground_speed {
        return false;
    }
    world
        .sweep_body(
            transform.translation,
            transform.rotation,
            Vec3::NEG_Y * ctx.cfg.ground_distance,
        )
        .is_some_and(|hit| hit.normal.y >= ctx.cfg.min_walk_cos)
}
