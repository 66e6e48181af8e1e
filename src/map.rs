//! Static tile map - the immutable world grid regions are cut from.
//!
//! The map is represented as a row-major array of tile ids with metadata
//! tables for collisions, interactive objects and cursors. It never changes
//! after load; everything per-player or conditional is layered on top of it.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::RegionError;

/// Raw tile id. `0` is a blank tile.
pub type TileId = u32;

/// Cursor hint sent for interactive tiles (e.g. "axe", "fishing").
pub type CursorId = String;

/// Grid-based static tile map.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
pub struct TileMap {
    /// Width of the map in tiles.
    pub width: u32,
    /// Height of the map in tiles.
    pub height: u32,
    /// Tile ids (row-major order).
    pub data: Vec<TileId>,
    /// Linear indices of colliding tiles.
    #[serde(default)]
    pub collisions: HashSet<usize>,
    /// Tile ids that are interactive objects.
    #[serde(default)]
    pub objects: HashSet<TileId>,
    /// Cursor shown when hovering a tile id.
    #[serde(default)]
    pub cursors: HashMap<TileId, CursorId>,
}

impl TileMap {
    /// Create a blank map.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
            ..Default::default()
        }
    }

    /// Load a map from its JSON description, validating the tile array.
    pub fn from_json(json: &str) -> Result<Self, RegionError> {
        let map: TileMap = serde_json::from_str(json)?;
        map.validate()?;
        Ok(map)
    }

    /// Ensure `data` covers exactly `width * height` tiles.
    pub fn validate(&self) -> Result<(), RegionError> {
        let expected = self.width as usize * self.height as usize;

        if self.data.len() != expected {
            return Err(RegionError::MapDataLength {
                expected,
                actual: self.data.len(),
            });
        }

        Ok(())
    }

    pub fn is_out_of_bounds(&self, x: u32, y: u32) -> bool {
        x >= self.width || y >= self.height
    }

    /// Linear index of a grid coordinate.
    pub fn coord_to_index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Grid coordinate of a linear index.
    pub fn index_to_coord(&self, index: usize) -> (u32, u32) {
        let width = self.width.max(1) as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    /// Tile id at a linear index, blank when outside the map.
    pub fn tile_data_at(&self, index: usize) -> TileId {
        self.data.get(index).copied().unwrap_or(0)
    }

    pub fn is_collision_index(&self, index: usize) -> bool {
        self.collisions.contains(&index)
    }

    pub fn is_object_tile(&self, data: TileId) -> bool {
        self.objects.contains(&data)
    }

    pub fn cursor_for(&self, data: TileId) -> Option<&CursorId> {
        self.cursors.get(&data)
    }

    /// Set a tile id by grid coordinates. Ignored outside the map.
    pub fn set_tile(&mut self, x: u32, y: u32, data: TileId) {
        if self.is_out_of_bounds(x, y) {
            return;
        }

        let index = self.coord_to_index(x, y);
        self.data[index] = data;
    }

    /// Mark a grid coordinate as colliding.
    pub fn add_collision(&mut self, x: u32, y: u32) {
        if !self.is_out_of_bounds(x, y) {
            let index = self.coord_to_index(x, y);
            self.collisions.insert(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_map_creation() {
        let map = TileMap::new(32, 16);
        assert_eq!(map.width, 32);
        assert_eq!(map.height, 16);
        assert_eq!(map.data.len(), 512);
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_index_coord_conversion() {
        let map = TileMap::new(32, 32);
        assert_eq!(map.coord_to_index(3, 2), 67);
        assert_eq!(map.index_to_coord(67), (3, 2));
        assert_eq!(map.index_to_coord(0), (0, 0));
    }

    #[test]
    fn test_metadata_lookups() {
        let mut map = TileMap::new(4, 4);
        map.set_tile(1, 1, 42);
        map.add_collision(1, 1);
        map.objects.insert(42);
        map.cursors.insert(42, "axe".to_string());

        let index = map.coord_to_index(1, 1);
        assert_eq!(map.tile_data_at(index), 42);
        assert!(map.is_collision_index(index));
        assert!(map.is_object_tile(42));
        assert_eq!(map.cursor_for(42).map(String::as_str), Some("axe"));
        assert!(map.cursor_for(7).is_none());
        assert_eq!(map.tile_data_at(10_000), 0);
    }

    #[test]
    fn test_from_json_rejects_short_data() {
        let json = r#"{"width": 2, "height": 2, "data": [1, 2, 3]}"#;
        match TileMap::from_json(json) {
            Err(RegionError::MapDataLength { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_from_json_with_metadata() {
        let json = r#"{
            "width": 2, "height": 1, "data": [5, 6],
            "collisions": [1], "objects": [6], "cursors": {"6": "talk"}
        }"#;
        let map = TileMap::from_json(json).unwrap();
        assert!(map.is_collision_index(1));
        assert!(map.is_object_tile(6));
        assert_eq!(map.cursor_for(6).map(String::as_str), Some("talk"));
    }
}
