//! Wire packets emitted by the region index.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::components::{EntityKind, Instance};
use crate::grid::RegionId;
use crate::map::{CursorId, TileId};

/// One tile as the client receives it. Optional flags are omitted from the
/// payload rather than sent as `false`/`null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionTileData {
    pub x: u32,
    pub y: u32,
    pub data: TileId,
    /// Colliding.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub c: bool,
    /// Interactive object.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub o: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cur: Option<CursorId>,
}

/// Tile payload keyed by region. Regions without data are left out.
pub type RegionData = BTreeMap<RegionId, Vec<RegionTileData>>;

/// Entity state carried by a spawn packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub instance: Instance,
    pub kind: EntityKind,
    pub x: u32,
    pub y: u32,
}

/// Viewer-specific presentation of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDisplayInfo {
    pub instance: Instance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Packet {
    Spawn(EntityState),
    Despawn { instance: Instance },
    /// Instances present around the receiving player.
    List(Vec<Instance>),
    Map(RegionData),
    Update(Vec<EntityDisplayInfo>),
}

impl Packet {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
