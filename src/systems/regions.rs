//! Region systems - membership updates, region entry, refresh and the join
//! flush.
//!
//! ## Tick Order
//! 1. `region_handle_system` re-homes every entity whose position changed;
//!    despawns are pushed synchronously from here.
//! 2. `dynamic_refresh_system` periodically re-sends conditional content to
//!    players that stayed put; players that just changed region are left to
//!    the next step, whose full payload already carries it.
//! 3. `region_enter_system` pushes region data and the entity list to
//!    players that entered a new region.
//! 4. `region_parse_system` drains every joining queue into spawn packets.
//!
//! ## Parallel Feature
//!
//! When compiled with `--features parallel`, the gather phase of the
//! refresh uses rayon. Each player's pass only reads its own bookkeeping,
//! so players never contend; results are applied sequentially.

use crate::area::DynamicAreas;
use crate::components::*;
use crate::config::{SyncConfig, SyncTick};
use crate::grid::{RegionGrid, RegionId};
use crate::lifecycle::Occupant;
use crate::map::TileMap;
use crate::packets::{EntityDisplayInfo, EntityState, Packet};
use crate::transport::{Outbox, PushScope};
use crate::tree::TreeSet;
use crate::visibility::{display_info, RegionPayload, RegionView};
use bevy_ecs::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ============================================================================
// DISPATCH
// ============================================================================

/// Push the player's region data.
pub fn send_region(
    view: &RegionView,
    outbox: &mut Outbox,
    player: Entity,
    position: Position,
    progress: &Progress,
    loaded: &mut LoadedContent,
    force: bool,
) {
    let data = view.region_data(position, progress, loaded, force);
    outbox.send(player, Packet::Map(data));
}

/// Push the instances visible from the player's home region.
pub fn send_entities(
    grid: &RegionGrid,
    outbox: &mut Outbox,
    player: Entity,
    region: RegionId,
    instance_of: impl Fn(Entity) -> Option<Instance>,
) {
    let Some(cell) = grid.get(region) else {
        return;
    };

    let mut instances: Vec<Instance> = cell
        .get_entities(player)
        .into_iter()
        .filter_map(instance_of)
        .collect();
    instances.sort();

    outbox.send(player, Packet::List(instances));
}

/// Push display info for the player, skipping empty updates.
pub fn send_display_info(outbox: &mut Outbox, player: Entity, infos: Vec<EntityDisplayInfo>) {
    if infos.is_empty() {
        return;
    }

    outbox.send(player, Packet::Update(infos));
}

/// Drain every region's joining queue: spawn each joining entity for the
/// players around the region (never to itself), then refresh display info
/// for the region's players.
pub fn parse(
    grid: &mut RegionGrid,
    outbox: &mut Outbox,
    state_of: impl Fn(Entity) -> Option<EntityState>,
    display_for: impl Fn(&RegionGrid, Entity, RegionId) -> Vec<EntityDisplayInfo>,
) {
    let mut flushed = 0;

    for region in 0..grid.len() {
        if !grid.regions[region].is_joining() {
            continue;
        }

        send_joining(grid, outbox, region, &state_of, &display_for);
        grid.regions[region].clear_joining();
        flushed += 1;
    }

    if flushed > 0 {
        log::trace!("Flushed joining queues of {flushed} regions.");
    }
}

fn send_joining(
    grid: &RegionGrid,
    outbox: &mut Outbox,
    region: RegionId,
    state_of: &impl Fn(Entity) -> Option<EntityState>,
    display_for: &impl Fn(&RegionGrid, Entity, RegionId) -> Vec<EntityDisplayInfo>,
) {
    let cell = &grid.regions[region];

    cell.for_each_joining(|&entity| {
        // Despawned before the flush.
        let Some(state) = state_of(entity) else {
            return;
        };

        let ignore = match state.kind {
            EntityKind::Player => Some(entity),
            EntityKind::Mob | EntityKind::Npc | EntityKind::Item | EntityKind::Tree => None,
        };

        outbox.push(grid, PushScope::Regions(region), ignore, Packet::Spawn(state));
    });

    cell.for_each_player(|&player| {
        send_display_info(outbox, player, display_for(grid, player, region))
    });
}

// ============================================================================
// SYSTEMS
// ============================================================================

/// System that re-homes entities whose position changed this tick.
pub fn region_handle_system(
    mut commands: Commands,
    mut grid: ResMut<RegionGrid>,
    mut outbox: ResMut<Outbox>,
    mut query: Query<
        (Entity, &Instance, &EntityKind, &Position, &mut RegionMembership),
        Changed<Position>,
    >,
) {
    for (entity, instance, kind, position, mut membership) in query.iter_mut() {
        let occupant = Occupant {
            entity,
            instance: *instance,
            kind: *kind,
            position: *position,
        };

        let Some(transition) = grid.handle(&mut outbox, &occupant, &mut membership) else {
            continue;
        };

        if transition.entering {
            commands.entity(entity).insert(NeedsRegionSync);
        }
    }
}

/// System that sends region data and the entity list to players that
/// entered a new region.
#[allow(clippy::too_many_arguments)]
pub fn region_enter_system(
    mut commands: Commands,
    grid: Res<RegionGrid>,
    map: Res<TileMap>,
    areas: Res<DynamicAreas>,
    trees: Res<TreeSet>,
    mut outbox: ResMut<Outbox>,
    mut players: Query<
        (Entity, &Position, &Progress, &RegionMembership, &mut LoadedContent),
        With<NeedsRegionSync>,
    >,
    instances: Query<&Instance>,
) {
    let view = RegionView::new(&grid, &map, &areas, &trees);

    for (entity, position, progress, membership, mut loaded) in players.iter_mut() {
        commands.entity(entity).remove::<NeedsRegionSync>();

        send_region(&view, &mut outbox, entity, *position, progress, &mut loaded, false);

        if let Some(region) = membership.region {
            send_entities(&grid, &mut outbox, entity, region, |e| instances.get(e).ok().copied());
        }
    }
}

/// System that re-sends conditional content on the configured cadence to
/// every player not awaiting a region sync.
#[allow(clippy::too_many_arguments)]
pub fn dynamic_refresh_system(
    config: Res<SyncConfig>,
    tick: Res<SyncTick>,
    grid: Res<RegionGrid>,
    map: Res<TileMap>,
    areas: Res<DynamicAreas>,
    trees: Res<TreeSet>,
    mut outbox: ResMut<Outbox>,
    mut players: Query<
        (Entity, &Position, &Progress, &mut LoadedContent),
        Without<NeedsRegionSync>,
    >,
) {
    if !config.should_refresh(tick.0) {
        return;
    }

    let view = RegionView::new(&grid, &map, &areas, &trees);

    // GATHER PHASE: every player's pass reads only its own bookkeeping.
    let viewers: Vec<(Entity, Position, &Progress, &LoadedContent)> = players
        .iter()
        .map(|(entity, position, progress, loaded)| (entity, *position, progress, loaded))
        .collect();

    #[cfg(feature = "parallel")]
    let payloads: Vec<(Entity, RegionPayload)> = viewers
        .par_iter()
        .map(|(entity, position, progress, loaded)| {
            (*entity, view.collect(*position, progress, loaded, false))
        })
        .collect();

    #[cfg(not(feature = "parallel"))]
    let payloads: Vec<(Entity, RegionPayload)> = viewers
        .iter()
        .map(|(entity, position, progress, loaded)| {
            (*entity, view.collect(*position, progress, loaded, false))
        })
        .collect();

    // APPLY PHASE
    for (entity, payload) in payloads {
        if let Ok((_, _, _, mut loaded)) = players.get_mut(entity) {
            loaded.apply(&payload);
        }

        if !payload.is_empty() {
            outbox.send(entity, Packet::Map(payload.data));
        }
    }
}

/// System that flushes every joining queue once per tick.
pub fn region_parse_system(
    mut grid: ResMut<RegionGrid>,
    mut outbox: ResMut<Outbox>,
    states: Query<(&Instance, &EntityKind, &Position)>,
    viewers: Query<&Progress>,
    rules: Query<(&Instance, &DisplayRule)>,
) {
    parse(
        &mut grid,
        &mut outbox,
        |entity| {
            states.get(entity).ok().map(|(instance, kind, position)| EntityState {
                instance: *instance,
                kind: *kind,
                x: position.x,
                y: position.y,
            })
        },
        |grid, player, region| {
            let Ok(progress) = viewers.get(player) else {
                return Vec::new();
            };

            display_info(grid, region, player, progress, |entity| {
                rules.get(entity).ok().map(|(instance, rule)| (*instance, rule))
            })
        },
    );
}
