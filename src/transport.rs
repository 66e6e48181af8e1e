//! Outgoing packet queue.
//!
//! The core never waits on delivery. Packets are pushed with a scope, the
//! scope is resolved to recipients against the grid at push time, and the
//! transport layer drains whatever accumulated after each tick.

use bevy_ecs::prelude::*;

use crate::grid::{RegionGrid, RegionId};
use crate::packets::Packet;

/// Who a pushed packet is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushScope {
    /// A single player.
    Player(Entity),
    /// Players whose home region is this region.
    Region(RegionId),
    /// Players whose home region is in the surrounding set of this region.
    Regions(RegionId),
}

/// A packet bound for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub recipient: Entity,
    pub packet: Packet,
}

#[derive(Resource, Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    /// Queue `packet` for every player in `scope` except `ignore`.
    pub fn push(
        &mut self,
        grid: &RegionGrid,
        scope: PushScope,
        ignore: Option<Entity>,
        packet: Packet,
    ) {
        let mut recipients = Vec::new();

        match scope {
            PushScope::Player(player) => recipients.push(player),
            PushScope::Region(region) => {
                if let Some(region) = grid.get(region) {
                    region.for_each_player(|player| recipients.push(*player));
                }
            }
            PushScope::Regions(region) => grid.for_each_surrounding_region(region, |surrounding| {
                if let Some(region) = grid.get(surrounding) {
                    region.for_each_player(|player| recipients.push(*player));
                }
            }),
        }

        for recipient in recipients {
            if Some(recipient) == ignore {
                continue;
            }

            self.queue.push(Outgoing {
                recipient,
                packet: packet.clone(),
            });
        }
    }

    /// Queue a packet for one player.
    pub fn send(&mut self, player: Entity, packet: Packet) {
        self.queue.push(Outgoing {
            recipient: player,
            packet,
        });
    }

    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outgoing> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
