//! Dynamic areas - zones whose rendered tiles depend on the viewer.
//!
//! A dynamic area covers a rectangle of the static map and remaps it onto
//! another rectangle for players who fulfill its requirement (e.g. a bridge
//! that only appears once a quest is finished).

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::Progress;

/// Identifier of a dynamic area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AreaId(pub u32);

/// Condition a viewer must meet to see conditional content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// Always fulfilled.
    #[default]
    None,
    /// Quest with this key is completed.
    Quest(String),
    /// Achievement with this key is completed.
    Achievement(String),
    /// Player level is at least this value.
    Level(u32),
}

impl Requirement {
    /// Unknown keys are simply unmet.
    pub fn fulfilled_by(&self, progress: &Progress) -> bool {
        match self {
            Requirement::None => true,
            Requirement::Quest(key) => progress.has_completed_quest(key),
            Requirement::Achievement(key) => progress.has_completed_achievement(key),
            Requirement::Level(level) => progress.level >= *level,
        }
    }
}

/// A rectangular area with a per-player requirement and an optional remap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicArea {
    pub id: AreaId,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub requirement: Requirement,
    /// Origin of the rectangle shown instead of this one.
    #[serde(default)]
    pub mapped: Option<(u32, u32)>,
}

impl DynamicArea {
    pub fn new(id: u32, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            id: AreaId(id),
            x,
            y,
            width,
            height,
            requirement: Requirement::None,
            mapped: None,
        }
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }

    pub fn mapped_to(mut self, x: u32, y: u32) -> Self {
        self.mapped = Some((x, y));
        self
    }

    /// Only areas with a remap take part in region tile data.
    pub fn is_mapping_area(&self) -> bool {
        self.mapped.is_some()
    }

    pub fn bounds_contain(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// Whether this area's bounds overlap the given rectangle.
    pub fn intersects(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        self.x < x + width
            && x < self.x + self.width
            && self.y < y + height
            && y < self.y + self.height
    }

    pub fn fulfills_requirement(&self, progress: &Progress) -> bool {
        self.requirement.fulfilled_by(progress)
    }

    /// Tile shown at `(x, y)` for players meeting the requirement.
    pub fn mapped_tile(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        if !self.bounds_contain(x, y) {
            return None;
        }

        let (mapped_x, mapped_y) = self.mapped?;

        Some((mapped_x + (x - self.x), mapped_y + (y - self.y)))
    }
}

/// All dynamic areas of the map, indexed by position in the list.
#[derive(Resource, Debug, Clone, Default)]
pub struct DynamicAreas {
    areas: Vec<DynamicArea>,
}

impl DynamicAreas {
    pub fn new(areas: Vec<DynamicArea>) -> Self {
        Self { areas }
    }

    pub fn get(&self, id: AreaId) -> Option<&DynamicArea> {
        self.areas.iter().find(|area| area.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicArea> {
        self.areas.iter()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements() {
        let mut progress = Progress::with_level(10);
        progress.quests.insert("bridge".to_string());

        assert!(Requirement::None.fulfilled_by(&progress));
        assert!(Requirement::Quest("bridge".to_string()).fulfilled_by(&progress));
        assert!(!Requirement::Quest("unknown".to_string()).fulfilled_by(&progress));
        assert!(!Requirement::Achievement("bridge".to_string()).fulfilled_by(&progress));
        assert!(Requirement::Level(10).fulfilled_by(&progress));
        assert!(!Requirement::Level(11).fulfilled_by(&progress));
    }

    #[test]
    fn test_mapped_tile_offsets_from_origin() {
        let area = DynamicArea::new(1, 4, 4, 2, 2).mapped_to(20, 30);

        assert_eq!(area.mapped_tile(4, 4), Some((20, 30)));
        assert_eq!(area.mapped_tile(5, 5), Some((21, 31)));
        assert_eq!(area.mapped_tile(6, 4), None);
    }

    #[test]
    fn test_area_without_mapping() {
        let area = DynamicArea::new(1, 0, 0, 3, 3);
        assert!(!area.is_mapping_area());
        assert_eq!(area.mapped_tile(1, 1), None);
    }

    #[test]
    fn test_intersects() {
        let area = DynamicArea::new(1, 14, 14, 4, 4);
        assert!(area.intersects(0, 0, 16, 16));
        assert!(area.intersects(16, 16, 16, 16));
        assert!(!area.intersects(32, 0, 16, 16));
    }
}
