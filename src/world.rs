//! Region index snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of region membership
//! for debugging tools and admin dashboards. It never exposes entity
//! handles, only wire instances.

use crate::components::*;
use crate::grid::{RegionGrid, RegionId};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Membership of a single non-empty region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub id: RegionId,
    /// Every entity whose neighbourhood covers this region.
    pub entities: Vec<Instance>,
    /// Players whose home region this is.
    pub players: Vec<Instance>,
    /// Entities waiting for the next join flush.
    pub joining: usize,
}

/// Snapshot of the whole region index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Regions per grid row.
    pub side_length: usize,
    /// Non-empty regions in id order.
    pub regions: Vec<RegionSnapshot>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &World, tick: u64) -> Self {
        let Some(grid) = world.get_resource::<RegionGrid>() else {
            return Self {
                tick,
                ..Default::default()
            };
        };

        let instance_of = |entity: &Entity| world.get::<Instance>(*entity).copied();

        let mut regions = Vec::new();

        for (id, region) in grid.iter() {
            if region.is_empty() && !region.is_joining() {
                continue;
            }

            let mut entities = Vec::with_capacity(region.entity_count());
            region.for_each_entity(|entity| entities.extend(instance_of(entity)));
            entities.sort();

            let mut players = Vec::with_capacity(region.player_count());
            region.for_each_player(|player| players.extend(instance_of(player)));
            players.sort();

            let mut joining = 0;
            region.for_each_joining(|_| joining += 1);

            regions.push(RegionSnapshot {
                id,
                entities,
                players,
                joining,
            });
        }

        Self {
            tick,
            side_length: grid.side_length(),
            regions,
        }
    }

    /// Membership of one region, if it was non-empty.
    pub fn region(&self, id: RegionId) -> Option<&RegionSnapshot> {
        self.regions.iter().find(|region| region.id == id)
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
