use thiserror::Error;

use crate::components::Instance;

/// Errors raised while building or driving the region index.
///
/// Per-tick lookups never produce these; an out-of-range coordinate or an
/// unassigned entity is an `Option::None` or an empty list instead.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The map cannot be split into whole regions.
    #[error("Corrupted map regions. Unable to divide {width}x{height} by {division_size}")]
    UnevenDivision {
        width: u32,
        height: u32,
        division_size: u32,
    },
    /// A division size of zero was configured.
    #[error("Region division size must be greater than zero")]
    ZeroDivision,
    /// Tile data does not cover the declared map dimensions.
    #[error("Map tile data has {actual} entries, expected {expected}")]
    MapDataLength { expected: usize, actual: usize },
    /// No live entity carries this instance id.
    #[error("No entity with instance {0:?}")]
    UnknownInstance(Instance),
    /// The instance exists but has no player state.
    #[error("Instance {0:?} is not a player")]
    NotPlayer(Instance),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
