//! Serialization utilities for region payloads.

use crate::packets::RegionData;

/// Serialize region data as the client expects it: region ids as keys.
pub fn region_data_to_json(data: &RegionData) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}
