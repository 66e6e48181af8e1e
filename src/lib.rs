//! Region Sync - Server-side spatial index and visibility engine
//!
//! Partitions a tile map into fixed-size regions, keeps every entity a
//! member of the regions around it, and computes per-player region payloads
//! (static tiles, conditional tiles, trees) plus spawn/despawn traffic.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod area;
pub mod components;
pub mod config;
pub mod error;
pub mod grid;
pub mod lifecycle;
pub mod map;
pub mod packets;
pub mod region;
pub mod systems;
pub mod transport;
pub mod tree;
pub mod visibility;
pub mod world;

pub use api::{Delivery, SyncWorld};
pub use area::{AreaId, DynamicArea, DynamicAreas, Requirement};
pub use components::*;
pub use config::{SyncConfig, SyncTick};
pub use error::RegionError;
pub use grid::{RegionGrid, RegionId};
pub use lifecycle::{Occupant, Transition};
pub use map::{CursorId, TileId, TileMap};
pub use packets::{EntityDisplayInfo, EntityState, Packet, RegionData, RegionTileData};
pub use region::Region;
pub use transport::{Outbox, Outgoing, PushScope};
pub use tree::{Tree, TreeId, TreeSet, TreeState};
pub use visibility::{RegionPayload, RegionView};
pub use world::{RegionSnapshot, Snapshot};
