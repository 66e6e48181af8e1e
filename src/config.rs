//! Runtime configuration for the region index.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::RegionError;

/// Configuration for region division and refresh cadence.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Region edge length in tiles. Must evenly divide map width and height.
    pub division_size: u32,
    /// Ticks between dynamic-content refreshes for every player (0 = off).
    pub refresh_interval: u64,
    /// Fail construction on an uneven division instead of running with an
    /// empty grid.
    pub strict_division: bool,
    /// Fixed timestep in seconds used by `SyncWorld::advance`.
    pub fixed_timestep: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            division_size: 16,
            refresh_interval: 0,
            strict_division: false,
            fixed_timestep: 1.0 / 4.0, // 4 Hz server tick
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, RegionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether the dynamic-content refresh runs on `tick`.
    #[inline]
    pub fn should_refresh(&self, tick: u64) -> bool {
        self.refresh_interval > 0 && tick % self.refresh_interval == 0
    }
}

/// Global simulation tick counter.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SyncTick(pub u64);

impl SyncTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}
