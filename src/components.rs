//! ECS Components for the region index.
//!
//! Components are pure data containers attached to entities.
//! Region membership and per-player visibility bookkeeping live here; the
//! logic that mutates them lives in `lifecycle`, `visibility` and `systems`.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::grid::RegionId;
use crate::tree::TreeId;

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Tile position in grid space (x = column, y = row).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// One tile step toward `target` on each axis.
    pub fn step_toward(&self, target: &Destination) -> Self {
        fn step(from: u32, to: u32) -> u32 {
            match from.cmp(&to) {
                std::cmp::Ordering::Less => from + 1,
                std::cmp::Ordering::Greater => from - 1,
                std::cmp::Ordering::Equal => from,
            }
        }

        Self {
            x: step(self.x, target.x),
            y: step(self.y, target.y),
        }
    }
}

/// Tile the entity is walking toward, one tile per tick.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub x: u32,
    pub y: u32,
}

impl Destination {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn reached_by(&self, pos: &Position) -> bool {
        pos.x == self.x && pos.y == self.y
    }
}

/// Region membership of an entity.
///
/// `region` is the home region (`None` until first assigned), `old_regions`
/// the despawn set computed on the last transition.
#[derive(Component, Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMembership {
    pub region: Option<RegionId>,
    pub old_regions: Vec<RegionId>,
}

impl RegionMembership {
    pub fn is_assigned(&self) -> bool {
        self.region.is_some()
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Wire identity of an entity, stable for its lifetime.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Instance(pub u64);

/// Kind of world entity. Player-only paths match on this exhaustively.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Mob,
    Npc,
    Item,
    Tree,
}

impl EntityKind {
    pub fn is_player(&self) -> bool {
        match self {
            EntityKind::Player => true,
            EntityKind::Mob | EntityKind::Npc | EntityKind::Item | EntityKind::Tree => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Mob => "mob",
            EntityKind::Npc => "npc",
            EntityKind::Item => "item",
            EntityKind::Tree => "tree",
        }
    }
}

// ============================================================================
// PLAYER COMPONENTS
// ============================================================================

/// Content progression used to evaluate area and display requirements.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub quests: HashSet<String>,
    pub achievements: HashSet<String>,
    pub level: u32,
}

impl Progress {
    pub fn with_level(level: u32) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn has_completed_quest(&self, key: &str) -> bool {
        self.quests.contains(key)
    }

    pub fn has_completed_achievement(&self, key: &str) -> bool {
        self.achievements.contains(key)
    }
}

/// Static payload already delivered to this player during the session.
///
/// Append-only until `clear` is called on reconnect or respawn.
#[derive(Component, Debug, Clone, Default)]
pub struct LoadedContent {
    pub regions: HashSet<RegionId>,
    pub trees: HashSet<TreeId>,
}

impl LoadedContent {
    pub fn has_loaded_region(&self, region: RegionId) -> bool {
        self.regions.contains(&region)
    }

    pub fn has_loaded_tree(&self, tree: TreeId) -> bool {
        self.trees.contains(&tree)
    }

    pub fn load_region(&mut self, region: RegionId) {
        self.regions.insert(region);
    }

    pub fn load_tree(&mut self, tree: TreeId) {
        self.trees.insert(tree);
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.trees.clear();
    }
}

/// Marker set when a player entered a new region this tick and needs
/// its region data and entity list pushed.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NeedsRegionSync;

// ============================================================================
// DISPLAY COMPONENTS
// ============================================================================

/// Per-viewer presentation override (nameplate colour, scale) shown only to
/// players who fulfill `requirement`.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct DisplayRule {
    pub requirement: crate::area::Requirement,
    pub colour: Option<String>,
    pub scale: Option<u32>,
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a connected player.
#[derive(Bundle)]
pub struct PlayerBundle {
    pub instance: Instance,
    pub kind: EntityKind,
    pub position: Position,
    pub membership: RegionMembership,
    pub progress: Progress,
    pub loaded: LoadedContent,
}

impl PlayerBundle {
    pub fn new(instance: u64, x: u32, y: u32, progress: Progress) -> Self {
        Self {
            instance: Instance(instance),
            kind: EntityKind::Player,
            position: Position::new(x, y),
            membership: RegionMembership::default(),
            progress,
            loaded: LoadedContent::default(),
        }
    }
}

/// Bundle for any server-controlled entity (mob, npc, item).
#[derive(Bundle)]
pub struct EntityBundle {
    pub instance: Instance,
    pub kind: EntityKind,
    pub position: Position,
    pub membership: RegionMembership,
}

impl EntityBundle {
    pub fn new(instance: u64, kind: EntityKind, x: u32, y: u32) -> Self {
        Self {
            instance: Instance(instance),
            kind,
            position: Position::new(x, y),
            membership: RegionMembership::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_toward_moves_one_tile_per_axis() {
        let pos = Position::new(5, 5);
        assert_eq!(pos.step_toward(&Destination::new(9, 1)), Position::new(6, 4));
        assert_eq!(pos.step_toward(&Destination::new(5, 5)), pos);
    }

    #[test]
    fn test_only_players_are_players() {
        assert!(EntityKind::Player.is_player());
        for kind in [EntityKind::Mob, EntityKind::Npc, EntityKind::Item, EntityKind::Tree] {
            assert!(!kind.is_player());
        }
    }

    #[test]
    fn test_loaded_content_clear() {
        let mut loaded = LoadedContent::default();
        loaded.load_region(3);
        loaded.load_tree(TreeId(7));
        assert!(loaded.has_loaded_region(3));
        assert!(loaded.has_loaded_tree(TreeId(7)));

        loaded.clear();
        assert!(!loaded.has_loaded_region(3));
        assert!(!loaded.has_loaded_tree(TreeId(7)));
    }
}
