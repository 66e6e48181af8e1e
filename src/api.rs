//! Public API for the region index.
//!
//! This module provides the main interface for the game server to drive
//! region membership and per-player visibility. Entities are addressed by
//! their wire `Instance`; ECS handles never leave this module.
//!
//! ## Fixed Timestep
//!
//! `step()` runs exactly one tick. `advance(dt)` accumulates wall time and
//! runs as many fixed ticks as fit, so the tick rate is independent of how
//! often the host calls in.
//!
//! ## Delivery
//!
//! Every entry point and every tick only queues packets. The host drains
//! them with `drain_deliveries()` and hands them to its transport; nothing
//! here waits on a client.

use crate::area::{DynamicArea, DynamicAreas};
use crate::components::*;
use crate::config::{SyncConfig, SyncTick};
use crate::error::RegionError;
use crate::grid::{RegionGrid, RegionId};
use crate::lifecycle::Occupant;
use crate::map::TileMap;
use crate::packets::{Packet, RegionData};
use crate::systems::*;
use crate::transport::Outbox;
use crate::tree::{Tree, TreeId, TreeSet, TreeState};
use crate::visibility::{display_info, RegionView};
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// A packet resolved to the instance that should receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: Instance,
    pub packet: Packet,
}

/// The region index world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Spawning, moving and despawning entities
/// - Stepping the tick pipeline
/// - Pulling region data and display info for players
/// - Draining queued packets
pub struct SyncWorld {
    world: World,
    schedule: Schedule,
    instances: HashMap<Instance, Entity>,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
}

impl SyncWorld {
    /// Build the region index for `map`.
    ///
    /// An uneven division degrades to an empty grid unless
    /// `config.strict_division` is set.
    pub fn new(
        config: SyncConfig,
        map: TileMap,
        areas: Vec<DynamicArea>,
        trees: Vec<Tree>,
    ) -> Result<Self, RegionError> {
        map.validate()?;

        let mut grid = if config.strict_division {
            RegionGrid::try_build(map.width, map.height, config.division_size)?
        } else {
            RegionGrid::build(map.width, map.height, config.division_size)
        };

        let areas = DynamicAreas::new(areas);
        let trees = TreeSet::new(trees);

        grid.attach_dynamic_areas(&areas);
        grid.attach_trees(&trees, &map);

        let mut world = World::new();

        world.insert_resource(grid);
        world.insert_resource(map);
        world.insert_resource(areas);
        world.insert_resource(trees);
        world.insert_resource(Outbox::default());
        world.insert_resource(SyncTick(0));
        world.insert_resource(config);

        let mut schedule = Schedule::default();

        schedule.add_systems(
            (
                movement_system,
                region_handle_system,
                dynamic_refresh_system,
                region_enter_system,
                region_parse_system,
            )
                .chain(),
        );

        Ok(Self {
            world,
            schedule,
            instances: HashMap::new(),
            time_accumulator: 0.0,
        })
    }

    /// Build with default configuration and no areas or trees.
    pub fn from_map(map: TileMap) -> Result<Self, RegionError> {
        Self::new(SyncConfig::default(), map, Vec::new(), Vec::new())
    }

    // ------------------------------------------------------------------
    // Ticking
    // ------------------------------------------------------------------

    /// Run a single tick of the pipeline.
    pub fn step(&mut self) {
        self.world.resource_mut::<SyncTick>().increment();
        self.schedule.run(&mut self.world);
    }

    /// Advance by `dt` seconds, running every fixed tick that fits.
    /// Returns the number of ticks run.
    pub fn advance(&mut self, dt: f32) -> u32 {
        let fixed_dt = self.world.resource::<SyncConfig>().fixed_timestep;

        if fixed_dt <= 0.0 {
            return 0;
        }

        self.time_accumulator += dt;

        let mut ticks = 0;

        while self.time_accumulator >= fixed_dt {
            self.step();
            self.time_accumulator -= fixed_dt;
            ticks += 1;
        }

        ticks
    }

    pub fn current_tick(&self) -> u64 {
        self.world.resource::<SyncTick>().0
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn spawn_player(&mut self, instance: u64, x: u32, y: u32, progress: Progress) -> Entity {
        self.spawn(Instance(instance), PlayerBundle::new(instance, x, y, progress))
    }

    pub fn spawn_mob(&mut self, instance: u64, x: u32, y: u32) -> Entity {
        self.spawn(Instance(instance), EntityBundle::new(instance, EntityKind::Mob, x, y))
    }

    pub fn spawn_npc(&mut self, instance: u64, x: u32, y: u32) -> Entity {
        self.spawn(Instance(instance), EntityBundle::new(instance, EntityKind::Npc, x, y))
    }

    pub fn spawn_item(&mut self, instance: u64, x: u32, y: u32) -> Entity {
        self.spawn(Instance(instance), EntityBundle::new(instance, EntityKind::Item, x, y))
    }

    fn spawn(&mut self, instance: Instance, bundle: impl Bundle) -> Entity {
        if self.instances.contains_key(&instance) {
            log::debug!("Replacing existing entity with instance {instance:?}.");

            if let Err(err) = self.despawn(instance) {
                log::debug!("Could not despawn replaced entity: {err}");
            }
        }

        let entity = self.world.spawn(bundle).id();
        self.instances.insert(instance, entity);
        entity
    }

    /// Attach a per-viewer display rule to an entity.
    pub fn set_display_rule(
        &mut self,
        instance: Instance,
        rule: DisplayRule,
    ) -> Result<(), RegionError> {
        let entity = self.entity(instance)?;
        self.world.entity_mut(entity).insert(rule);
        Ok(())
    }

    /// Place an entity at `(x, y)`, cancelling any walk in progress. The
    /// region transition happens on the next tick or on `handle`.
    pub fn move_entity(&mut self, instance: Instance, x: u32, y: u32) -> Result<(), RegionError> {
        let entity = self.entity(instance)?;
        let mut entity_mut = self.world.entity_mut(entity);

        entity_mut.remove::<Destination>();

        if let Some(mut position) = entity_mut.get_mut::<Position>() {
            *position = Position::new(x, y);
        }

        Ok(())
    }

    /// Walk an entity toward `(x, y)` one tile per tick.
    pub fn set_destination(
        &mut self,
        instance: Instance,
        x: u32,
        y: u32,
    ) -> Result<(), RegionError> {
        let entity = self.entity(instance)?;
        self.world.entity_mut(entity).insert(Destination::new(x, y));
        Ok(())
    }

    /// Remove an entity from the index and the world.
    /// Returns the regions it was despawned from.
    pub fn despawn(&mut self, instance: Instance) -> Result<Vec<RegionId>, RegionError> {
        let despawned = self.remove(instance)?;

        if let Some(entity) = self.instances.remove(&instance) {
            self.world.despawn(entity);
        }

        Ok(despawned)
    }

    // ------------------------------------------------------------------
    // Region membership
    // ------------------------------------------------------------------

    /// Re-evaluate the entity's home region now. Returns whether a region
    /// transition occurred.
    pub fn handle(&mut self, instance: Instance) -> Result<bool, RegionError> {
        let entity = self.entity(instance)?;
        let occupant = self.occupant(entity).ok_or(RegionError::UnknownInstance(instance))?;

        let transition = self
            .with_region_state(entity, |grid, outbox, membership| {
                grid.handle(outbox, &occupant, membership)
            })
            .flatten();

        let Some(transition) = transition else {
            return Ok(false);
        };

        if transition.entering {
            self.world.entity_mut(entity).insert(NeedsRegionSync);
        }

        Ok(true)
    }

    /// Take the entity out of every region it belongs to, pushing despawns.
    /// Returns the regions it was despawned from.
    pub fn remove(&mut self, instance: Instance) -> Result<Vec<RegionId>, RegionError> {
        let entity = self.entity(instance)?;
        let occupant = self.occupant(entity).ok_or(RegionError::UnknownInstance(instance))?;

        Ok(self
            .with_region_state(entity, |grid, outbox, membership| {
                grid.remove(outbox, &occupant, membership)
            })
            .unwrap_or_default())
    }

    /// Home region of an entity, `None` while unassigned.
    pub fn region_of(&self, instance: Instance) -> Option<RegionId> {
        let entity = self.instances.get(&instance)?;
        self.world.get::<RegionMembership>(*entity)?.region
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Region data for a player, marking what it returns as loaded.
    /// `force` re-sends static tiles of regions the player already loaded.
    pub fn get_region_data(
        &mut self,
        instance: Instance,
        force: bool,
    ) -> Result<RegionData, RegionError> {
        let entity = self.player_entity(instance)?;
        self.region_data_for(entity, force).ok_or(RegionError::NotPlayer(instance))
    }

    /// Region data for a player as its JSON wire form.
    pub fn get_region_data_json(
        &mut self,
        instance: Instance,
        force: bool,
    ) -> Result<String, RegionError> {
        let data = self.get_region_data(instance, force)?;
        Ok(region_data_to_json(&data)?)
    }

    /// Queue the player's region data.
    pub fn send_region(&mut self, instance: Instance) -> Result<(), RegionError> {
        let entity = self.player_entity(instance)?;
        self.send_region_to(entity);
        Ok(())
    }

    /// Queue the instances visible from the player's home region.
    pub fn send_entities(&mut self, instance: Instance) -> Result<(), RegionError> {
        let entity = self.player_entity(instance)?;

        let Some(region) = self.world.get::<RegionMembership>(entity).and_then(|m| m.region) else {
            return Ok(());
        };

        self.world.resource_scope(|world, mut outbox: Mut<Outbox>| {
            let grid = world.resource::<RegionGrid>();
            send_entities(grid, &mut outbox, entity, region, |e| world.get::<Instance>(e).copied());
        });

        Ok(())
    }

    /// Queue region data for every player whose home is `region`.
    pub fn send_update(&mut self, region: RegionId) {
        let mut players = Vec::new();

        if let Some(cell) = self.world.resource::<RegionGrid>().get(region) {
            cell.for_each_player(|player| players.push(*player));
        }

        for player in players {
            self.send_region_to(player);
        }
    }

    /// Queue display info for the entities around the player.
    pub fn send_display_info(&mut self, instance: Instance) -> Result<(), RegionError> {
        let entity = self.player_entity(instance)?;

        let Some(region) = self.world.get::<RegionMembership>(entity).and_then(|m| m.region) else {
            return Ok(());
        };

        self.world.resource_scope(|world, mut outbox: Mut<Outbox>| {
            let Some(progress) = world.get::<Progress>(entity) else {
                return;
            };

            let infos = display_info(world.resource::<RegionGrid>(), region, entity, progress, |e| {
                Some((*world.get::<Instance>(e)?, world.get::<DisplayRule>(e)?))
            });

            send_display_info(&mut outbox, entity, infos);
        });

        Ok(())
    }

    /// Forget everything the player loaded, e.g. on reconnect or respawn.
    pub fn reset_visibility(&mut self, instance: Instance) -> Result<(), RegionError> {
        let entity = self.player_entity(instance)?;

        if let Some(mut loaded) = self.world.get_mut::<LoadedContent>(entity) {
            loaded.clear();
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    pub fn complete_quest(
        &mut self,
        instance: Instance,
        key: impl Into<String>,
    ) -> Result<(), RegionError> {
        let key = key.into();
        self.with_progress(instance, |progress| {
            progress.quests.insert(key);
        })
    }

    pub fn complete_achievement(
        &mut self,
        instance: Instance,
        key: impl Into<String>,
    ) -> Result<(), RegionError> {
        let key = key.into();
        self.with_progress(instance, |progress| {
            progress.achievements.insert(key);
        })
    }

    pub fn set_level(&mut self, instance: Instance, level: u32) -> Result<(), RegionError> {
        self.with_progress(instance, |progress| progress.level = level)
    }

    fn with_progress(
        &mut self,
        instance: Instance,
        f: impl FnOnce(&mut Progress),
    ) -> Result<(), RegionError> {
        let entity = self.player_entity(instance)?;
        let mut progress = self
            .world
            .get_mut::<Progress>(entity)
            .ok_or(RegionError::NotPlayer(instance))?;

        f(&mut progress);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trees
    // ------------------------------------------------------------------

    /// Cut a grown tree. Returns whether its state changed.
    pub fn cut_tree(&mut self, id: TreeId) -> bool {
        self.set_tree_state(id, TreeState::Cut)
    }

    /// Regrow a cut tree. Returns whether its state changed.
    pub fn grow_tree(&mut self, id: TreeId) -> bool {
        self.set_tree_state(id, TreeState::Grown)
    }

    fn set_tree_state(&mut self, id: TreeId, state: TreeState) -> bool {
        {
            let mut trees = self.world.resource_mut::<TreeSet>();

            let Some(tree) = trees.get_mut(id) else {
                return false;
            };

            if tree.state == state {
                return false;
            }

            tree.state = state;
        }

        let regions: Vec<RegionId> = self
            .world
            .resource::<RegionGrid>()
            .iter()
            .filter(|(_, region)| region.trees().contains(&id))
            .map(|(region, _)| region)
            .collect();

        for region in regions {
            self.send_update(region);
        }

        true
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Take every queued packet, addressed by instance.
    pub fn drain_deliveries(&mut self) -> Vec<Delivery> {
        let queued = self.world.resource_mut::<Outbox>().drain();

        queued
            .into_iter()
            .filter_map(|outgoing| {
                Some(Delivery {
                    recipient: *self.world.get::<Instance>(outgoing.recipient)?,
                    packet: outgoing.packet,
                })
            })
            .collect()
    }

    /// Get a snapshot of the current region index.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_world(&self.world, self.current_tick())
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    /// Get the region grid (for debugging/visualization).
    pub fn grid(&self) -> &RegionGrid {
        self.world.resource::<RegionGrid>()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn entity(&self, instance: Instance) -> Result<Entity, RegionError> {
        self.instances
            .get(&instance)
            .copied()
            .ok_or(RegionError::UnknownInstance(instance))
    }

    fn player_entity(&self, instance: Instance) -> Result<Entity, RegionError> {
        let entity = self.entity(instance)?;

        match self.world.get::<EntityKind>(entity) {
            Some(EntityKind::Player) => Ok(entity),
            Some(EntityKind::Mob | EntityKind::Npc | EntityKind::Item | EntityKind::Tree)
            | None => Err(RegionError::NotPlayer(instance)),
        }
    }

    fn occupant(&self, entity: Entity) -> Option<Occupant> {
        Some(Occupant {
            entity,
            instance: *self.world.get::<Instance>(entity)?,
            kind: *self.world.get::<EntityKind>(entity)?,
            position: *self.world.get::<Position>(entity)?,
        })
    }

    fn with_region_state<R>(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut RegionGrid, &mut Outbox, &mut RegionMembership) -> R,
    ) -> Option<R> {
        self.world.resource_scope(|world, mut grid: Mut<RegionGrid>| {
            world.resource_scope(|world, mut outbox: Mut<Outbox>| {
                let mut membership = world.get_mut::<RegionMembership>(entity)?;
                Some(f(&mut grid, &mut outbox, &mut membership))
            })
        })
    }

    fn region_data_for(&mut self, entity: Entity, force: bool) -> Option<RegionData> {
        let position = *self.world.get::<Position>(entity)?;

        // Take the bookkeeping out so the view can borrow the world.
        let mut loaded = std::mem::take(&mut *self.world.get_mut::<LoadedContent>(entity)?);

        let data = {
            let world = &self.world;
            let progress = world.get::<Progress>(entity).cloned().unwrap_or_default();
            let view = RegionView::new(
                world.resource::<RegionGrid>(),
                world.resource::<TileMap>(),
                world.resource::<DynamicAreas>(),
                world.resource::<TreeSet>(),
            );

            view.region_data(position, &progress, &mut loaded, force)
        };

        if let Some(mut slot) = self.world.get_mut::<LoadedContent>(entity) {
            *slot = loaded;
        }

        Some(data)
    }

    fn send_region_to(&mut self, player: Entity) {
        if let Some(data) = self.region_data_for(player, false) {
            self.world.resource_mut::<Outbox>().send(player, Packet::Map(data));
        }
    }
}
