//! Animation cues owned by climbing, and the interface to the animation collaborator.
//!
//! The crate never plays animations itself. It triggers [`PlayClimbCue`] when a cue should
//! start and waits for the host to trigger [`ClimbCueEnded`] once the montage finished or
//! was interrupted. Root motion flows back through [`RootMotion`], warp anchors through
//! [`MotionWarpTargets`].

use bevy_platform::collections::HashMap;
use tracing::debug;

use crate::{mode::transition, prelude::*};

pub(super) fn plugin(app: &mut App) {
    app.add_observer(on_cue_ended);
}

/// Warp target fed with the vault start anchor.
pub const VAULT_START: &str = "VaultStart";
/// Warp target fed with the vault landing anchor.
pub const VAULT_LAND: &str = "VaultLand";

/// Opaque handle to a montage known to the animation collaborator.
#[derive(Clone, Copy, Reflect, Debug, PartialEq, Eq, Hash)]
pub struct AnimationCue(pub u64);

#[derive(Clone, Copy, Reflect, Debug, PartialEq, Eq, Hash)]
pub enum CueKind {
    IdleToClimb,
    ClimbToLedge,
    IdleToLedge,
    Vault,
}

/// The montages climbing may request. Every slot has to be filled before it is used.
#[derive(Component, Clone, Copy, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct ClimbCues {
    pub idle_to_climb: Option<AnimationCue>,
    pub climb_to_ledge: Option<AnimationCue>,
    pub idle_to_ledge: Option<AnimationCue>,
    pub vault: Option<AnimationCue>,
}

impl ClimbCues {
    fn slot(&self, kind: CueKind) -> Option<AnimationCue> {
        match kind {
            CueKind::IdleToClimb => self.idle_to_climb,
            CueKind::ClimbToLedge => self.climb_to_ledge,
            CueKind::IdleToLedge => self.idle_to_ledge,
            CueKind::Vault => self.vault,
        }
    }

    /// The cue configured for `kind`.
    ///
    /// # Panics
    ///
    /// Panics when no cue was configured for `kind`. That is a setup error, not a
    /// runtime condition.
    pub fn get(&self, kind: CueKind) -> AnimationCue {
        self.slot(kind)
            .unwrap_or_else(|| panic!("no animation cue configured for {kind:?}"))
    }

    /// Which climbing cue `cue` is, if it is one of ours.
    pub fn kind_of(&self, cue: AnimationCue) -> Option<CueKind> {
        [
            CueKind::IdleToClimb,
            CueKind::ClimbToLedge,
            CueKind::IdleToLedge,
            CueKind::Vault,
        ]
        .into_iter()
        .find(|&kind| self.slot(kind) == Some(cue))
    }
}

/// Cue currently playing on the body, if any.
#[derive(Component, Clone, Copy, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct CuePlayback {
    pub playing: Option<AnimationCue>,
}

impl CuePlayback {
    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    /// Requests `cue` from the animation collaborator.
    ///
    /// Cues never preempt each other: while one is playing, the request is dropped and
    /// `false` is returned.
    pub fn play(&mut self, commands: &mut Commands, entity: Entity, cue: AnimationCue) -> bool {
        if let Some(playing) = self.playing {
            debug!("{entity}: dropping cue {cue:?}, {playing:?} is still playing");
            return false;
        }
        self.playing = Some(cue);
        commands.trigger(PlayClimbCue { entity, cue });
        true
    }
}

/// Asks the animation collaborator to start a montage on `entity`.
#[derive(EntityEvent, Clone, Copy, Debug)]
pub struct PlayClimbCue {
    pub entity: Entity,
    pub cue: AnimationCue,
}

/// Triggered by the animation collaborator when a cue finished or was interrupted.
#[derive(EntityEvent, Clone, Copy, Debug)]
pub struct ClimbCueEnded {
    pub entity: Entity,
    pub cue: AnimationCue,
    pub interrupted: bool,
}

/// Named world-space anchors that animation root motion is warped to reach.
#[derive(Component, Clone, Default, Debug)]
pub struct MotionWarpTargets(HashMap<&'static str, Vec3>);

impl MotionWarpTargets {
    pub fn set(&mut self, name: &'static str, position: Vec3) {
        self.0.insert(name, position);
    }

    pub fn get(&self, name: &str) -> Option<Vec3> {
        self.0.get(name).copied()
    }
}

/// Root-motion velocity extracted by the animation collaborator this tick.
///
/// While set, it replaces the computed velocity and rotation of the body.
#[derive(Component, Clone, Copy, Reflect, Default, Debug, Deref, DerefMut)]
#[reflect(Component)]
pub struct RootMotion(pub Option<Vec3>);

impl RootMotion {
    /// Root motion to apply for a body in `mode`.
    ///
    /// A body falling without a cue keeps its own vertical velocity so gravity still acts;
    /// otherwise root motion is used as is.
    pub fn constrained(&self, mode: MovementMode, cue_playing: bool, current: Vec3) -> Option<Vec3> {
        let root = self.0?;
        if mode == MovementMode::Falling && !cue_playing {
            return Some(vec3(root.x, current.y, root.z));
        }
        Some(root)
    }
}

pub(crate) fn on_cue_ended(
    ended: On<ClimbCueEnded>,
    mut commands: Commands,
    mut climbers: Query<(
        &mut ClimbState,
        &ClimbCues,
        &mut CuePlayback,
        &mut Transform,
        &mut LinearVelocity,
    )>,
) {
    let entity = ended.entity;
    let Ok((mut state, cues, mut playback, mut transform, mut velocity)) =
        climbers.get_mut(entity)
    else {
        return;
    };
    if playback.playing == Some(ended.cue) {
        playback.playing = None;
    }
    let Some(kind) = cues.kind_of(ended.cue) else {
        return;
    };
    debug!(
        "{entity}: cue {kind:?} ended{}",
        if ended.interrupted { " (interrupted)" } else { "" }
    );
    let next = match kind {
        CueKind::IdleToClimb | CueKind::IdleToLedge => MovementMode::Climbing,
        CueKind::ClimbToLedge | CueKind::Vault => MovementMode::Grounded,
    };
    transition(
        &mut commands,
        entity,
        &mut state,
        &mut transform,
        &mut velocity.0,
        next,
    );
}
