//! Tracks whether the fixed main loop ticked during the current frame.

use crate::prelude::*;

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<FixedTickedThisFrame>()
        .add_systems(PreUpdate, |mut ticked: ResMut<FixedTickedThisFrame>| {
            **ticked = false;
        })
        .add_systems(FixedPreUpdate, |mut ticked: ResMut<FixedTickedThisFrame>| {
            **ticked = true;
        });
}

#[derive(Resource, Debug, Deref, DerefMut, Default)]
pub(crate) struct FixedTickedThisFrame(bool);

/// Run condition for systems that consume what the fixed loop accumulated.
pub(crate) fn fixed_ticked_this_frame(ticked: Res<FixedTickedThisFrame>) -> bool {
    **ticked
}
