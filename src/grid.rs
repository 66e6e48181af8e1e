//! Region grid - splits the map into fixed-size square cells.
//!
//! Provides O(1) cell lookup and the 3x3 neighbourhood ("surrounding set")
//! used as every entity's visibility radius.
//!
//! ```text
//!  4 x 4 regions (side length 4)
//!   0  1  2  3
//!   4  5  6  7
//!   8  9 10 11
//!  12 13 14 15
//! ```
//!
//! Cells are numbered row-major. The surrounding set of a corner cell has 4
//! members, an edge cell 6 and an interior cell 9. Client hit-testing relies
//! on these sets being symmetric, so the edge handling must not drift.

use bevy_ecs::prelude::*;

use crate::area::DynamicAreas;
use crate::error::RegionError;
use crate::map::TileMap;
use crate::region::Region;
use crate::tree::TreeSet;

/// Index of a region in the grid.
pub type RegionId = usize;

#[derive(Resource, Debug, Clone, Default)]
pub struct RegionGrid {
    pub(crate) regions: Vec<Region>,
    division_size: u32,
    /// Number of regions per row.
    side_length: usize,
    width: u32,
    height: u32,
}

impl RegionGrid {
    /// Build the grid, degrading to zero regions when the map cannot be
    /// evenly divided. Every later lookup then yields `None` or an empty set.
    pub fn build(width: u32, height: u32, division_size: u32) -> Self {
        match Self::try_build(width, height, division_size) {
            Ok(grid) => grid,
            Err(err) => {
                log::error!("{err}");
                log::error!("Map: {width}x{height} - divisions: {division_size}.");

                Self {
                    regions: Vec::new(),
                    division_size,
                    side_length: 0,
                    width,
                    height,
                }
            }
        }
    }

    /// Build the grid or fail when the map cannot be evenly divided.
    pub fn try_build(width: u32, height: u32, division_size: u32) -> Result<Self, RegionError> {
        if division_size == 0 {
            return Err(RegionError::ZeroDivision);
        }

        if width % division_size != 0 || height % division_size != 0 {
            return Err(RegionError::UnevenDivision {
                width,
                height,
                division_size,
            });
        }

        let mut regions = Vec::new();

        for y in (0..height).step_by(division_size as usize) {
            for x in (0..width).step_by(division_size as usize) {
                regions.push(Region::new(x, y, division_size, division_size));
            }
        }

        Ok(Self {
            regions,
            division_size,
            side_length: (width / division_size) as usize,
            width,
            height,
        })
    }

    pub fn division_size(&self) -> u32 {
        self.division_size
    }

    pub fn side_length(&self) -> usize {
        self.side_length
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, region: RegionId) -> Option<&Region> {
        self.regions.get(region)
    }

    pub fn get_mut(&mut self, region: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(region)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions.iter().enumerate()
    }

    /// Region containing the tile, `None` when outside the map.
    pub fn cell_of(&self, x: u32, y: u32) -> Option<RegionId> {
        if self.regions.is_empty() || x >= self.width || y >= self.height {
            return None;
        }

        let division = self.division_size as usize;
        let region = (y as usize / division) * self.side_length + x as usize / division;

        (region < self.regions.len()).then_some(region)
    }

    /// The region itself followed by its neighbours, clipped at the map edges.
    pub fn surrounding(&self, region: RegionId) -> Vec<RegionId> {
        if region >= self.regions.len() {
            return Vec::new();
        }

        let mut surrounding = vec![region];

        self.push_horizontal(region, &mut surrounding);

        if !self.is_top_edge(region) {
            let above = region - self.side_length;
            surrounding.push(above);
            self.push_horizontal(above, &mut surrounding);
        }

        if !self.is_bottom_edge(region) {
            let below = region + self.side_length;
            surrounding.push(below);
            self.push_horizontal(below, &mut surrounding);
        }

        surrounding
    }

    pub fn for_each_surrounding_region(&self, region: RegionId, callback: impl FnMut(RegionId)) {
        self.surrounding(region).into_iter().for_each(callback);
    }

    fn push_horizontal(&self, region: RegionId, out: &mut Vec<RegionId>) {
        if !self.is_left_edge(region) {
            out.push(region - 1);
        }

        if !self.is_right_edge(region) {
            out.push(region + 1);
        }
    }

    fn is_left_edge(&self, region: RegionId) -> bool {
        region % self.side_length == 0
    }

    fn is_right_edge(&self, region: RegionId) -> bool {
        region % self.side_length == self.side_length - 1
    }

    fn is_top_edge(&self, region: RegionId) -> bool {
        region < self.side_length
    }

    fn is_bottom_edge(&self, region: RegionId) -> bool {
        region + self.side_length >= self.regions.len()
    }

    /// Attach every mapping area to the regions its bounds overlap.
    pub fn attach_dynamic_areas(&mut self, areas: &DynamicAreas) {
        for area in areas.iter().filter(|area| area.is_mapping_area()) {
            if self.cell_of(area.x, area.y).is_none() {
                log::error!("[ID: {:?}] Dynamic area could not be processed.", area.id);
                continue;
            }

            for region in self.regions.iter_mut() {
                if area.intersects(region.x, region.y, region.width, region.height) {
                    region.add_dynamic_area(area.id);
                }
            }
        }
    }

    /// Attach every tree to the regions its tiles fall in.
    pub fn attach_trees(&mut self, trees: &TreeSet, map: &TileMap) {
        for tree in trees.iter() {
            for index in tree.indices() {
                let (x, y) = map.index_to_coord(index);

                if let Some(region) = self.cell_of(x, y) {
                    self.regions[region].add_tree(tree.id);
                }
            }
        }
    }
}
