//! Per-player incremental region encoder.
//!
//! For a player's surrounding regions this decides which tiles must be
//! (re)transmitted:
//!
//! - **Trees** are sent once per session; a loaded tree is never re-sent.
//! - **Dynamic tiles** are resolved against the viewer's progress and sent
//!   on every pass, since eligibility changes without a position change.
//! - **Static tiles** are sent once per region per session unless forced.
//!   Blank tiles are left out, as are tiles already covered in the same
//!   pass by an emitted tree or a dynamic area.
//!
//! Collection is split from bookkeeping: `collect` only reads the player's
//! `LoadedContent` and reports what it emitted, so many players can be
//! collected in parallel and the results applied afterwards.

use bevy_ecs::prelude::*;
use crate::area::{DynamicArea, DynamicAreas};
use crate::components::{DisplayRule, Instance, LoadedContent, Position, Progress};
use crate::grid::{RegionGrid, RegionId};
use crate::map::{TileId, TileMap};
use crate::packets::{EntityDisplayInfo, RegionData, RegionTileData};
use crate::region::Region;
use crate::tree::{TreeId, TreeSet};

/// Read-only view over everything a visibility pass consults.
#[derive(Clone, Copy)]
pub struct RegionView<'a> {
    pub grid: &'a RegionGrid,
    pub map: &'a TileMap,
    pub areas: &'a DynamicAreas,
    pub trees: &'a TreeSet,
}

/// Output of one visibility pass for one player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionPayload {
    pub data: RegionData,
    /// Regions whose static tiles were included.
    pub regions: Vec<RegionId>,
    /// Trees whose tiles were included.
    pub trees: Vec<TreeId>,
}

impl RegionPayload {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl LoadedContent {
    /// Record what a payload delivered.
    pub fn apply(&mut self, payload: &RegionPayload) {
        payload.regions.iter().for_each(|&region| self.load_region(region));
        payload.trees.iter().for_each(|&tree| self.load_tree(tree));
    }
}

impl<'a> RegionView<'a> {
    pub fn new(
        grid: &'a RegionGrid,
        map: &'a TileMap,
        areas: &'a DynamicAreas,
        trees: &'a TreeSet,
    ) -> Self {
        Self { grid, map, areas, trees }
    }

    /// Region data for a player at `position`, marking what was sent as loaded.
    /// `force` re-sends static tiles of regions already loaded.
    pub fn region_data(
        &self,
        position: Position,
        progress: &Progress,
        loaded: &mut LoadedContent,
        force: bool,
    ) -> RegionData {
        let payload = self.collect(position, progress, loaded, force);

        loaded.apply(&payload);

        payload.data
    }

    /// Compute the payload without touching the player's bookkeeping.
    pub fn collect(
        &self,
        position: Position,
        progress: &Progress,
        loaded: &LoadedContent,
        force: bool,
    ) -> RegionPayload {
        let mut payload = RegionPayload::default();

        let Some(region) = self.grid.cell_of(position.x, position.y) else {
            return payload;
        };

        for surrounding in self.grid.surrounding(region) {
            let Some(cell) = self.grid.get(surrounding) else {
                continue;
            };

            let mut tiles = Vec::new();

            if cell.has_trees() {
                tiles.extend(self.tree_data(cell, loaded, &mut payload.trees));
            }

            if cell.has_dynamic_areas() {
                tiles.extend(self.dynamic_tile_data(cell, progress));
            }

            if force || !loaded.has_loaded_region(surrounding) {
                tiles.extend(self.static_tile_data(cell, &payload.trees));
                payload.regions.push(surrounding);
            }

            // Leave empty regions out so the client does not parse them.
            if !tiles.is_empty() {
                payload.data.insert(surrounding, tiles);
            }
        }

        payload
    }

    /// Static tiles of the region. A tile is skipped when a tree emitted in
    /// this pass or one of the region's dynamic areas already covers it; a
    /// tile under a tree the player loaded earlier is still sent.
    fn static_tile_data(&self, region: &Region, emitted: &[TreeId]) -> Vec<RegionTileData> {
        let mut tiles = Vec::new();

        region.for_each_tile(|x, y| {
            let index = self.map.coord_to_index(x, y);

            let under_emitted_tree = self
                .trees
                .owner_of(index)
                .is_some_and(|tree| emitted.contains(&tree));

            if under_emitted_tree || region.dynamic_area_at(self.areas, x, y).is_some() {
                return;
            }

            let tile = self.build_tile(x, y, Some(index), None);

            if tile.data < 1 {
                return;
            }

            tiles.push(tile);
        });

        tiles
    }

    fn dynamic_tile_data(&self, region: &Region, progress: &Progress) -> Vec<RegionTileData> {
        let mut tiles = Vec::new();

        region.for_each_dynamic_tile(self.areas, |x, y, area| {
            tiles.push(self.build_dynamic_tile(progress, area, x, y));
        });

        tiles
    }

    /// Tiles of every tree in the region not yet loaded by the player or
    /// already emitted earlier in this pass.
    fn tree_data(
        &self,
        region: &Region,
        loaded: &LoadedContent,
        emitted: &mut Vec<TreeId>,
    ) -> Vec<RegionTileData> {
        let mut tiles = Vec::new();

        for &id in region.trees() {
            if loaded.has_loaded_tree(id) || emitted.contains(&id) {
                continue;
            }

            let Some(tree) = self.trees.get(id) else {
                continue;
            };

            tree.for_each_tile(|data, index| {
                let (x, y) = self.map.index_to_coord(index);
                tiles.push(self.build_tile(x, y, Some(index), Some(data)));
            });

            emitted.push(id);
        }

        tiles
    }

    /// Build the client view of a tile. `index` and `data` skip the lookups
    /// when the caller already has them.
    pub fn build_tile(
        &self,
        x: u32,
        y: u32,
        index: Option<usize>,
        data: Option<TileId>,
    ) -> RegionTileData {
        let index = index.unwrap_or_else(|| self.map.coord_to_index(x, y));
        let data = data.unwrap_or_else(|| self.map.tile_data_at(index));

        RegionTileData {
            x,
            y,
            data,
            c: self.map.is_collision_index(index),
            o: self.map.is_object_tile(data),
            cur: self.map.cursor_for(data).cloned(),
        }
    }

    /// The tile at `(x, y)` as this viewer sees it: the area's mapped tile
    /// when the requirement is met, otherwise the plain static tile.
    pub fn build_dynamic_tile(
        &self,
        progress: &Progress,
        area: &DynamicArea,
        x: u32,
        y: u32,
    ) -> RegionTileData {
        if !area.fulfills_requirement(progress) {
            return self.build_tile(x, y, None, None);
        }

        match area.mapped_tile(x, y) {
            Some((mapped_x, mapped_y)) if !self.map.is_out_of_bounds(mapped_x, mapped_y) => {
                let index = self.map.coord_to_index(mapped_x, mapped_y);
                self.build_tile(x, y, Some(index), None)
            }
            _ => self.build_tile(x, y, None, None),
        }
    }
}

/// Display info for every entity visible from `region` whose rule the
/// viewer fulfills. Entities without a rule are skipped.
pub fn display_info<'w>(
    grid: &RegionGrid,
    region: RegionId,
    viewer: Entity,
    progress: &Progress,
    lookup: impl Fn(Entity) -> Option<(Instance, &'w DisplayRule)>,
) -> Vec<EntityDisplayInfo> {
    let Some(region) = grid.get(region) else {
        return Vec::new();
    };

    let mut infos = Vec::new();

    region.for_each_entity(|&entity| {
        if entity == viewer {
            return;
        }

        let Some((instance, rule)) = lookup(entity) else {
            return;
        };

        if !rule.requirement.fulfilled_by(progress) {
            return;
        }

        infos.push(EntityDisplayInfo {
            instance,
            colour: rule.colour.clone(),
            scale: rule.scale,
        });
    });

    infos.sort_by_key(|info| info.instance);
    infos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::Requirement;
    use crate::tree::{Tree, TreeState};
    use std::collections::HashMap;

    struct Fixture {
        grid: RegionGrid,
        map: TileMap,
        areas: DynamicAreas,
        trees: TreeSet,
    }

    impl Fixture {
        /// 64x64 map, 16x16 regions. Every tile is 1 except a blank
        /// column; (2, 2) is a colliding object with a cursor; a quest-gated
        /// area at (4..6, 4) maps onto (40..42, 40); a tree sits at (8, 8).
        fn new() -> Self {
            let mut map = TileMap::new(64, 64);
            for y in 0..64 {
                for x in 1..64 {
                    map.set_tile(x, y, 1);
                }
            }
            map.set_tile(2, 2, 50);
            map.add_collision(2, 2);
            map.objects.insert(50);
            map.cursors.insert(50, "talk".to_string());
            map.set_tile(40, 40, 77);
            map.set_tile(41, 40, 78);

            let tree_index = map.coord_to_index(8, 8);
            map.set_tile(8, 8, 0);
            let trees = TreeSet::new(vec![Tree::new(
                1,
                vec![(tree_index, 300)],
                vec![(tree_index, 301)],
            )]);

            let areas = DynamicAreas::new(vec![DynamicArea::new(1, 4, 4, 2, 1)
                .with_requirement(Requirement::Quest("bridge".to_string()))
                .mapped_to(40, 40)]);

            let mut grid = RegionGrid::build(64, 64, 16);
            grid.attach_dynamic_areas(&areas);
            grid.attach_trees(&trees, &map);

            Self { grid, map, areas, trees }
        }

        fn view(&self) -> RegionView<'_> {
            RegionView::new(&self.grid, &self.map, &self.areas, &self.trees)
        }
    }

    fn tiles_at(data: &RegionData, region: RegionId) -> HashMap<(u32, u32), RegionTileData> {
        data.get(&region)
            .map(|tiles| tiles.iter().map(|t| ((t.x, t.y), t.clone())).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_build_tile_is_idempotent() {
        let fixture = Fixture::new();
        let view = fixture.view();

        let first = view.build_tile(2, 2, None, None);
        let second = view.build_tile(2, 2, None, None);

        assert_eq!(first, second);
        assert_eq!(first.data, 50);
        assert!(first.c && first.o);
        assert_eq!(first.cur.as_deref(), Some("talk"));

        let plain = view.build_tile(3, 3, None, None);
        assert!(!plain.c && !plain.o && plain.cur.is_none());
    }

    #[test]
    fn test_first_pass_sends_surrounding_static_tiles() {
        let fixture = Fixture::new();
        let mut loaded = LoadedContent::default();
        let data = fixture
            .view()
            .region_data(Position::new(1, 1), &Progress::default(), &mut loaded, false);

        let keys: Vec<RegionId> = data.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 4, 5]);
        assert_eq!(loaded.regions.len(), 4);

        let region = tiles_at(&data, 0);
        // Blank column omitted.
        assert!(!region.contains_key(&(0, 5)));
        assert_eq!(region[&(3, 3)].data, 1);
        // Tree tile carries the tree payload.
        assert_eq!(region[&(8, 8)].data, 300);
    }

    #[test]
    fn test_loaded_region_static_tiles_not_resent() {
        let fixture = Fixture::new();
        let view = fixture.view();
        let mut loaded = LoadedContent::default();
        let progress = Progress::default();

        view.region_data(Position::new(40, 40), &progress, &mut loaded, false);
        let again = view.region_data(Position::new(40, 40), &progress, &mut loaded, false);
        assert!(again.is_empty());

        let forced = view.region_data(Position::new(40, 40), &progress, &mut loaded, true);
        assert_eq!(forced.len(), 9);
    }

    #[test]
    fn test_dynamic_tiles_resent_every_call() {
        let fixture = Fixture::new();
        let view = fixture.view();
        let mut loaded = LoadedContent::default();
        let progress = Progress::default();

        view.region_data(Position::new(1, 1), &progress, &mut loaded, false);
        let again = view.region_data(Position::new(1, 1), &progress, &mut loaded, false);

        let keys: Vec<RegionId> = again.keys().copied().collect();
        assert_eq!(keys, vec![0]);
        let region = tiles_at(&again, 0);
        assert_eq!(region.len(), 2);
        // Unmet requirement falls back to the static tile.
        assert_eq!(region[&(4, 4)].data, 1);
        assert_eq!(region[&(5, 4)].data, 1);
    }

    #[test]
    fn test_dynamic_tiles_follow_requirement() {
        let fixture = Fixture::new();
        let view = fixture.view();
        let mut progress = Progress::default();
        progress.quests.insert("bridge".to_string());

        let loaded = LoadedContent::default();
        let payload = view.collect(Position::new(1, 1), &progress, &loaded, false);
        let region = tiles_at(&payload.data, 0);

        assert_eq!(region[&(4, 4)].data, 77);
        assert_eq!(region[&(5, 4)].data, 78);
        assert_eq!(region[&(6, 4)].data, 1);
    }

    #[test]
    fn test_trees_sent_once_even_after_state_change() {
        let mut fixture = Fixture::new();
        let mut loaded = LoadedContent::default();
        let progress = Progress::default();

        let first = fixture.view().collect(Position::new(1, 1), &progress, &loaded, false);
        assert_eq!(first.trees, vec![TreeId(1)]);
        loaded.apply(&first);

        if let Some(tree) = fixture.trees.get_mut(TreeId(1)) {
            tree.state = TreeState::Cut;
        }

        let second = fixture.view().collect(Position::new(1, 1), &progress, &loaded, false);
        assert!(second.trees.is_empty());
        assert!(!tiles_at(&second.data, 0).contains_key(&(8, 8)));

        loaded.clear();
        let reset = fixture.view().collect(Position::new(1, 1), &progress, &loaded, false);
        assert_eq!(tiles_at(&reset.data, 0)[&(8, 8)].data, 301);
    }

    #[test]
    fn test_forced_pass_sends_static_tile_under_loaded_tree() {
        let mut fixture = Fixture::new();
        fixture.map.set_tile(8, 8, 9);
        let view = fixture.view();
        let progress = Progress::default();
        let mut loaded = LoadedContent::default();

        let data_at = |data: &RegionData, x: u32, y: u32| -> Vec<TileId> {
            data[&0].iter().filter(|t| (t.x, t.y) == (x, y)).map(|t| t.data).collect()
        };

        // The tree covers its tile on the pass that emits it.
        let first = view.region_data(Position::new(1, 1), &progress, &mut loaded, false);
        assert_eq!(data_at(&first, 8, 8), vec![300]);

        let forced = view.region_data(Position::new(1, 1), &progress, &mut loaded, true);
        assert_eq!(data_at(&forced, 8, 8), vec![9]);
        // Area tiles come from the dynamic pass only.
        assert_eq!(data_at(&forced, 4, 4), vec![1]);
    }

    #[test]
    fn test_collect_does_not_touch_bookkeeping() {
        let fixture = Fixture::new();
        let loaded = LoadedContent::default();
        let payload = fixture
            .view()
            .collect(Position::new(20, 20), &Progress::default(), &loaded, false);

        assert_eq!(payload.regions.len(), 9);
        assert!(loaded.regions.is_empty());
    }

    #[test]
    fn test_out_of_bounds_viewer_gets_nothing() {
        let fixture = Fixture::new();
        let mut loaded = LoadedContent::default();
        let data = fixture
            .view()
            .region_data(Position::new(100, 100), &Progress::default(), &mut loaded, false);

        assert!(data.is_empty());
        assert!(loaded.regions.is_empty());
    }

    #[test]
    fn test_display_info_filters_by_requirement() {
        let mut grid = RegionGrid::build(32, 32, 16);
        let (viewer, shown, hidden, plain) = (
            Entity::from_raw(1),
            Entity::from_raw(2),
            Entity::from_raw(3),
            Entity::from_raw(4),
        );
        for entity in [viewer, shown, hidden, plain] {
            grid.get_mut(0).unwrap().add_entity(entity);
        }

        let shown_rule = DisplayRule {
            requirement: Requirement::Level(5),
            colour: Some("gold".to_string()),
            scale: None,
        };
        let hidden_rule = DisplayRule {
            requirement: Requirement::Achievement("slayer".to_string()),
            colour: None,
            scale: Some(2),
        };

        let infos = display_info(&grid, 0, viewer, &Progress::with_level(5), |entity| {
            if entity == shown {
                Some((Instance(2), &shown_rule))
            } else if entity == hidden {
                Some((Instance(3), &hidden_rule))
            } else {
                None
            }
        });

        assert_eq!(
            infos,
            vec![EntityDisplayInfo {
                instance: Instance(2),
                colour: Some("gold".to_string()),
                scale: None,
            }]
        );
    }
}
