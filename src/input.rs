use crate::{fixed_tick::fixed_ticked_this_frame, mode::ToggleClimb, prelude::*};

pub(super) fn plugin(app: &mut App) {
    app.add_observer(apply_movement)
        .add_observer(apply_climb)
        .add_systems(
            RunFixedMainLoop,
            clear_accumulated_input
                .run_if(fixed_ticked_this_frame)
                .in_set(RunFixedMainLoopSystems::AfterFixedMainLoop),
        );
}

/// Stick input. `y` climbs up the wall, `x` moves sideways along it.
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct Movement;

/// Toggles climbing on press.
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Climb;

/// Input accumulated since the last fixed update loop. Is cleared after every fixed update loop.
#[derive(Component, Clone, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct AccumulatedInput {
    // The last non-zero move that was input since the last fixed update loop
    pub last_movement: Option<Vec2>,
}

fn apply_movement(
    movement: On<Fire<Movement>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_input) = accumulated_inputs.get_mut(movement.context) {
        accumulated_input.last_movement = Some(movement.value);
    }
}

fn apply_climb(climb: On<Start<Climb>>, mut commands: Commands, states: Query<&ClimbState>) {
    let Ok(state) = states.get(climb.context) else {
        return;
    };
    commands.trigger(ToggleClimb {
        entity: climb.context,
        enable: !state.mode.is_climb_related(),
    });
}

fn clear_accumulated_input(mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    for mut accumulated_input in &mut accumulated_inputs {
        *accumulated_input = AccumulatedInput::default();
    }
}

#[cfg(test)]
mod tests {
    use bevy_ecs::system::RunSystemOnce as _;

    use super::*;

    #[test]
    fn accumulated_input_is_cleared() {
        let mut world = World::new();
        let entity = world
            .spawn(AccumulatedInput {
                last_movement: Some(Vec2::Y),
            })
            .id();
        world.run_system_once(clear_accumulated_input).unwrap();
        assert_eq!(
            world.get::<AccumulatedInput>(entity).unwrap().last_movement,
            None
        );
    }
}
