//! A single region: one cell of the grid and its mutable membership.

use bevy_ecs::prelude::*;
use std::collections::HashSet;

use crate::area::{AreaId, DynamicArea, DynamicAreas};
use crate::tree::TreeId;

/// One fixed-size cell of the world.
///
/// `entities` holds everything visible in the cell (entities whose home
/// region neighbours it), `players` only the players whose home region it
/// is. Areas and trees are referenced by id, never owned.
#[derive(Debug, Clone, Default)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    entities: HashSet<Entity>,
    players: HashSet<Entity>,
    joining: Vec<Entity>,
    dynamic_areas: Vec<AreaId>,
    trees: Vec<TreeId>,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn in_region(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.insert(entity);
    }

    /// Returns whether the entity was a member.
    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        self.entities.remove(&entity)
    }

    pub fn has_entity(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    pub fn add_player(&mut self, player: Entity) {
        self.players.insert(player);
    }

    pub fn remove_player(&mut self, player: Entity) {
        self.players.remove(&player);
    }

    pub fn has_player(&self, player: Entity) -> bool {
        self.players.contains(&player)
    }

    pub fn add_joining(&mut self, entity: Entity) {
        self.joining.push(entity);
    }

    pub fn is_joining(&self) -> bool {
        !self.joining.is_empty()
    }

    /// Joining entities in insertion order.
    pub fn for_each_joining(&self, callback: impl FnMut(&Entity)) {
        self.joining.iter().for_each(callback);
    }

    pub fn clear_joining(&mut self) {
        self.joining.clear();
    }

    pub fn for_each_entity(&self, callback: impl FnMut(&Entity)) {
        self.entities.iter().for_each(callback);
    }

    pub fn for_each_player(&self, callback: impl FnMut(&Entity)) {
        self.players.iter().for_each(callback);
    }

    /// Every member except `except` (usually the requesting player).
    pub fn get_entities(&self, except: Entity) -> Vec<Entity> {
        self.entities.iter().copied().filter(|&e| e != except).collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn add_dynamic_area(&mut self, area: AreaId) {
        if !self.dynamic_areas.contains(&area) {
            self.dynamic_areas.push(area);
        }
    }

    pub fn has_dynamic_areas(&self) -> bool {
        !self.dynamic_areas.is_empty()
    }

    pub fn add_tree(&mut self, tree: TreeId) {
        if !self.trees.contains(&tree) {
            self.trees.push(tree);
        }
    }

    pub fn has_trees(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn trees(&self) -> &[TreeId] {
        &self.trees
    }

    /// Visit every tile of the cell in row-major order.
    pub fn for_each_tile(&self, mut callback: impl FnMut(u32, u32)) {
        for y in self.y..self.y + self.height {
            for x in self.x..self.x + self.width {
                callback(x, y);
            }
        }
    }

    /// Visit every tile of the cell covered by one of its dynamic areas,
    /// paired with the first area that covers it.
    pub fn for_each_dynamic_tile<'a>(
        &self,
        areas: &'a DynamicAreas,
        mut callback: impl FnMut(u32, u32, &'a DynamicArea),
    ) {
        let attached: Vec<&DynamicArea> = self
            .dynamic_areas
            .iter()
            .filter_map(|id| areas.get(*id))
            .collect();

        if attached.is_empty() {
            return;
        }

        self.for_each_tile(|x, y| {
            if let Some(area) = attached.iter().find(|area| area.bounds_contain(x, y)) {
                callback(x, y, *area);
            }
        });
    }

    /// Dynamic area governing a tile of this cell, if any.
    pub fn dynamic_area_at<'a>(
        &self,
        areas: &'a DynamicAreas,
        x: u32,
        y: u32,
    ) -> Option<&'a DynamicArea> {
        self.dynamic_areas
            .iter()
            .filter_map(|id| areas.get(*id))
            .find(|area| area.bounds_contain(x, y))
    }
}
