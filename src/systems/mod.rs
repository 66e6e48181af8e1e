//! ECS Systems for the region index.
//!
//! Systems contain the per-tick logic that operates on components and the
//! region grid.
//!
//! ## System Order
//!
//! All systems run chained, once per tick, on the single world shard:
//!
//! 1. `movement_system` - advances entities toward their `Destination`
//! 2. `region_handle_system` - re-homes moved entities, pushes despawns
//! 3. `dynamic_refresh_system` - periodic resend of conditional tiles to
//!    players that did not change region this tick
//! 4. `region_enter_system` - sends region data and entity lists to
//!    players that entered a new region
//! 5. `region_parse_system` - flushes joining queues into spawns
//!
//! Commands issued by one system (the `NeedsRegionSync` marker, removed
//! destinations) are applied before the next one runs.

pub mod movement;
pub mod regions;
pub mod serialization;

pub use movement::*;
pub use regions::*;
pub use serialization::*;
