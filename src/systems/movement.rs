//! Movement system - walks entities toward their destination.

use crate::components::*;
use crate::map::TileMap;
use bevy_ecs::prelude::*;

/// System that advances every entity with a `Destination` by one tile.
///
/// Only entities that actually move have their `Position` written, so
/// change detection downstream sees real moves only. A colliding next tile
/// or an arrival drops the destination.
pub fn movement_system(
    mut commands: Commands,
    map: Res<TileMap>,
    mut query: Query<(Entity, &Instance, &mut Position, &Destination)>,
) {
    for (entity, instance, mut pos, destination) in query.iter_mut() {
        if destination.reached_by(&pos) {
            commands.entity(entity).remove::<Destination>();
            continue;
        }

        let next = pos.step_toward(destination);

        let blocked = map.is_out_of_bounds(next.x, next.y)
            || map.is_collision_index(map.coord_to_index(next.x, next.y));

        if blocked {
            log::trace!("{instance:?} blocked at ({}, {})", next.x, next.y);
            commands.entity(entity).remove::<Destination>();
            continue;
        }

        *pos = next;

        if destination.reached_by(&pos) {
            commands.entity(entity).remove::<Destination>();
        }
    }
}
