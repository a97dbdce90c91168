//! Entering and leaving climbing.

use tracing::debug;

use crate::{
    cue::{ClimbCues, CueKind, CuePlayback, MotionWarpTargets, VAULT_LAND, VAULT_START},
    decision::{BodyPose, VaultPlan, can_start_climbing, can_start_descending, can_vault},
    prelude::*,
    probe::{AvianProbe, GeometryProbe, ProbeHit},
    surface::aggregate,
};

pub(super) fn plugin(app: &mut App) {
    app.add_observer(on_toggle_climb)
        .add_observer(swap_climb_collider);
}

/// Requests climbing to start (`enable`) or stop.
///
/// Starting is evaluated against the world right away; when nothing can be climbed,
/// descended or vaulted the request is ignored.
#[derive(EntityEvent, Clone, Copy, Debug)]
pub struct ToggleClimb {
    pub entity: Entity,
    pub enable: bool,
}

/// Triggered whenever the movement mode of a climber changes.
#[derive(EntityEvent, Clone, Copy, Debug)]
pub struct ClimbModeChanged {
    pub entity: Entity,
    pub previous: MovementMode,
    pub current: MovementMode,
}

impl ClimbModeChanged {
    pub fn entered_climbing(&self) -> bool {
        self.current.is_climbing() && !self.previous.is_climbing()
    }

    pub fn exited_climbing(&self) -> bool {
        self.previous.is_climbing() && !self.current.is_climbing()
    }
}

/// The first way onto the wall that is currently possible.
#[derive(Clone, Debug, PartialEq)]
pub enum ClimbEntry {
    Climb(Vec<ProbeHit>),
    Descend,
    Vault(VaultPlan),
}

/// Checks the entries in priority order: climb, then descend, then vault.
pub fn evaluate_toggle_on(
    probe: &impl GeometryProbe,
    pose: &BodyPose,
    cfg: &ClimbController,
) -> Option<ClimbEntry> {
    if let Some(hits) = can_start_climbing(probe, pose, cfg) {
        return Some(ClimbEntry::Climb(hits));
    }
    if can_start_descending(probe, pose, cfg) {
        return Some(ClimbEntry::Descend);
    }
    can_vault(probe, pose, cfg).map(ClimbEntry::Vault)
}

/// Switches `state` to `next`, applies the side effects of entering or leaving climbing,
/// and announces the change.
pub(crate) fn transition(
    commands: &mut Commands,
    entity: Entity,
    state: &mut ClimbState,
    transform: &mut Transform,
    velocity: &mut Vec3,
    next: MovementMode,
) {
    let previous = state.mode;
    if previous == next {
        return;
    }
    state.mode = next;
    debug!("{entity}: {previous:?} -> {next:?}");

    let changed = ClimbModeChanged {
        entity,
        previous,
        current: next,
    };
    if changed.entered_climbing() {
        state.orient_rotation_to_movement = false;
    } else if changed.exited_climbing() {
        state.orient_rotation_to_movement = true;
        *velocity = Vec3::ZERO;
        stand_upright(transform);
    }
    commands.trigger(changed);
}

/// Keeps the heading, drops pitch and roll.
fn stand_upright(transform: &mut Transform) {
    let (yaw, _, _) = transform.rotation.to_euler(EulerRot::YXZ);
    transform.rotation = Quat::from_rotation_y(yaw);
}

/// Borrowed components of a climber about to enter climbing.
pub(crate) struct Climber<'a> {
    pub entity: Entity,
    pub state: &'a mut ClimbState,
    pub cues: &'a ClimbCues,
    pub playback: &'a mut CuePlayback,
    pub warp: &'a mut MotionWarpTargets,
    pub transform: &'a mut Transform,
    pub velocity: &'a mut Vec3,
}

/// Plays the cue for `entry` and switches into the matching mode.
///
/// Nothing changes when another cue is still playing.
pub(crate) fn enter(commands: &mut Commands, climber: Climber, entry: ClimbEntry) {
    let Climber {
        entity,
        state,
        cues,
        playback,
        warp,
        transform,
        velocity,
    } = climber;
    let next = match entry {
        ClimbEntry::Climb(hits) => {
            if !playback.play(commands, entity, cues.get(CueKind::IdleToClimb)) {
                return;
            }
            state.surface = aggregate(&hits);
            state.hits = hits;
            MovementMode::EnteringClimb
        }
        ClimbEntry::Descend => {
            if !playback.play(commands, entity, cues.get(CueKind::IdleToLedge)) {
                return;
            }
            MovementMode::EnteringLedge
        }
        ClimbEntry::Vault(plan) => {
            warp.set(VAULT_START, plan.start);
            warp.set(VAULT_LAND, plan.end);
            if !playback.play(commands, entity, cues.get(CueKind::Vault)) {
                return;
            }
            MovementMode::Vaulting
        }
    };
    transition(commands, entity, state, transform, velocity, next);
}

/// Handles a toggle request against the geometry around the climber.
///
/// Switching off only applies to climb-related modes and always ends in
/// [`MovementMode::Falling`]. Switching on is ignored while already in one.
pub(crate) fn toggle_climb(
    world: &impl GeometryProbe,
    commands: &mut Commands,
    climber: Climber,
    cfg: &ClimbController,
    enable: bool,
) {
    let climb_related = climber.state.mode.is_climb_related();
    if !enable {
        if climb_related {
            transition(
                commands,
                climber.entity,
                climber.state,
                climber.transform,
                climber.velocity,
                MovementMode::Falling,
            );
        }
        return;
    }
    if climb_related {
        return;
    }

    let pose = BodyPose::new(
        climber.transform,
        *climber.velocity,
        climber.state.is_falling(),
    );
    let Some(entry) = evaluate_toggle_on(world, &pose, cfg) else {
        debug!("{}: nothing to climb", climber.entity);
        return;
    };
    enter(commands, climber, entry);
}

fn on_toggle_climb(
    toggle: On<ToggleClimb>,
    mut commands: Commands,
    move_and_slide: MoveAndSlide,
    mut climbers: Query<(
        &ClimbController,
        &mut ClimbState,
        &ClimbCues,
        &mut CuePlayback,
        &mut MotionWarpTargets,
        &mut Transform,
        &mut LinearVelocity,
    )>,
) {
    let entity = toggle.entity;
    let Ok((cfg, mut state, cues, mut playback, mut warp, mut transform, mut velocity)) =
        climbers.get_mut(entity)
    else {
        return;
    };
    let collider = state.collider().clone();
    let geometry = AvianProbe {
        move_and_slide: &move_and_slide,
        body: &collider,
        cfg,
    };
    toggle_climb(
        &geometry,
        &mut commands,
        Climber {
            entity,
            state: &mut state,
            cues,
            playback: &mut playback,
            warp: &mut warp,
            transform: &mut transform,
            velocity: &mut velocity.0,
        },
        cfg,
        toggle.enable,
    );
}

fn swap_climb_collider(
    changed: On<ClimbModeChanged>,
    mut commands: Commands,
    states: Query<&ClimbState>,
) {
    if !changed.entered_climbing() && !changed.exited_climbing() {
        return;
    }
    let Ok(state) = states.get(changed.entity) else {
        return;
    };
    commands
        .entity(changed.entity)
        .try_insert(state.collider().clone());
}
