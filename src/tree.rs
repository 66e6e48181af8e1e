//! Harvestable trees.
//!
//! A tree spans several tiles and carries its own tile payload, one set
//! while grown and another (the stump) once cut. Its tile indices are blank
//! in the static map.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::map::TileId;

/// Stable identity used for per-player "already loaded" tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TreeState {
    #[default]
    Grown,
    Cut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub id: TreeId,
    /// `(index, data)` pairs shown while grown.
    pub tiles: Vec<(usize, TileId)>,
    /// `(index, data)` pairs shown once cut.
    #[serde(default)]
    pub stump: Vec<(usize, TileId)>,
    #[serde(default)]
    pub state: TreeState,
}

impl Tree {
    pub fn new(id: u32, tiles: Vec<(usize, TileId)>, stump: Vec<(usize, TileId)>) -> Self {
        Self {
            id: TreeId(id),
            tiles,
            stump,
            state: TreeState::Grown,
        }
    }

    /// Visit the tiles of the current state.
    pub fn for_each_tile(&self, mut callback: impl FnMut(TileId, usize)) {
        let tiles = match self.state {
            TreeState::Grown => &self.tiles,
            TreeState::Cut => &self.stump,
        };

        for &(index, data) in tiles {
            callback(data, index);
        }
    }

    /// Every index the tree may occupy in either state.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.tiles.iter().chain(self.stump.iter()).map(|(index, _)| *index)
    }

    pub fn is_cut(&self) -> bool {
        self.state == TreeState::Cut
    }
}

/// All trees of the map, with a reverse lookup from tile index.
#[derive(Resource, Debug, Clone, Default)]
pub struct TreeSet {
    trees: HashMap<TreeId, Tree>,
    owners: HashMap<usize, TreeId>,
}

impl TreeSet {
    pub fn new(trees: Vec<Tree>) -> Self {
        let mut set = Self::default();

        for tree in trees {
            for index in tree.indices() {
                set.owners.insert(index, tree.id);
            }
            set.trees.insert(tree.id, tree);
        }

        set
    }

    pub fn get(&self, id: TreeId) -> Option<&Tree> {
        self.trees.get(&id)
    }

    pub fn get_mut(&mut self, id: TreeId) -> Option<&mut Tree> {
        self.trees.get_mut(&id)
    }

    /// Tree occupying a tile index, if any.
    pub fn owner_of(&self, index: usize) -> Option<TreeId> {
        self.owners.get(&index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tree> {
        self.trees.values()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_each_tile_follows_state() {
        let mut tree = Tree::new(1, vec![(10, 100), (11, 101)], vec![(11, 200)]);

        let mut grown = Vec::new();
        tree.for_each_tile(|data, index| grown.push((index, data)));
        assert_eq!(grown, vec![(10, 100), (11, 101)]);

        tree.state = TreeState::Cut;
        let mut cut = Vec::new();
        tree.for_each_tile(|data, index| cut.push((index, data)));
        assert_eq!(cut, vec![(11, 200)]);
    }

    #[test]
    fn test_owner_lookup() {
        let set = TreeSet::new(vec![Tree::new(3, vec![(5, 1)], vec![(6, 2)])]);
        assert_eq!(set.owner_of(5), Some(TreeId(3)));
        assert_eq!(set.owner_of(6), Some(TreeId(3)));
        assert_eq!(set.owner_of(7), None);
    }
}
