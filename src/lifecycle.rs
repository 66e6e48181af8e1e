//! Entity lifecycle - keeps region membership consistent as entities move.
//!
//! An entity is either unassigned (`region == None`) or assigned to a home
//! region, and is a member of every region in its home's surrounding set.
//! On a region transition the entity is queued on its new region's joining
//! queue, dropped from the old neighbourhood cells that no longer see it
//! (which get a despawn right away), and added to the new neighbourhood.

use bevy_ecs::prelude::*;

use crate::components::{EntityKind, Instance, Position, RegionMembership};
use crate::grid::{RegionGrid, RegionId};
use crate::packets::Packet;
use crate::transport::{Outbox, PushScope};

/// The parts of an entity the lifecycle reads.
#[derive(Debug, Clone, Copy)]
pub struct Occupant {
    pub entity: Entity,
    pub instance: Instance,
    pub kind: EntityKind,
    pub position: Position,
}

/// Result of a region transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// New home region, `None` when the entity left the map.
    pub region: Option<RegionId>,
    /// Regions the entity was despawned from.
    pub despawned: Vec<RegionId>,
    /// Whether the player must be sent its new region data.
    pub entering: bool,
}

impl RegionGrid {
    /// Re-evaluate the home region of an occupant after a position update.
    ///
    /// Returns `None` when the entity stayed in its region.
    pub fn handle(
        &mut self,
        outbox: &mut Outbox,
        occupant: &Occupant,
        membership: &mut RegionMembership,
    ) -> Option<Transition> {
        let region = self.cell_of(occupant.position.x, occupant.position.y);

        if membership.region.is_some() && membership.region == region {
            return None;
        }

        let Some(region) = region else {
            // Walked off the map (or the grid is empty): treat as removal.
            if !membership.is_assigned() {
                return None;
            }

            let despawned = self.remove(outbox, occupant, membership);

            return Some(Transition {
                region: None,
                despawned,
                entering: false,
            });
        };

        self.joining(occupant, region);

        let retained = self.surrounding(region);
        let despawned = self.despawn_from(outbox, occupant, membership.region, |r| {
            !retained.contains(&r)
        });

        self.enter(occupant, region);

        membership.region = Some(region);
        membership.old_regions = despawned.clone();

        let entering = match occupant.kind {
            EntityKind::Player => {
                log::debug!("Entity: {:?} entering region: {region}.", occupant.instance);
                true
            }
            EntityKind::Mob | EntityKind::Npc | EntityKind::Item | EntityKind::Tree => false,
        };

        Some(Transition {
            region: Some(region),
            despawned,
            entering,
        })
    }

    /// Remove an occupant from every region it is a member of.
    ///
    /// Returns the regions it was despawned from; empty when unassigned.
    pub fn remove(
        &mut self,
        outbox: &mut Outbox,
        occupant: &Occupant,
        membership: &mut RegionMembership,
    ) -> Vec<RegionId> {
        if !membership.is_assigned() {
            return Vec::new();
        }

        let despawned = self.despawn_from(outbox, occupant, membership.region, |_| true);

        membership.region = None;
        membership.old_regions = despawned.clone();

        despawned
    }

    fn joining(&mut self, occupant: &Occupant, region: RegionId) {
        let Some(cell) = self.get_mut(region) else {
            return;
        };

        cell.add_joining(occupant.entity);

        if occupant.kind.is_player() {
            log::debug!("Entity: {:?} joining region: {region}.", occupant.instance);
        }
    }

    fn enter(&mut self, occupant: &Occupant, region: RegionId) {
        for surrounding in self.surrounding(region) {
            if let Some(cell) = self.get_mut(surrounding) {
                cell.add_entity(occupant.entity);
            }
        }

        if occupant.kind.is_player() {
            if let Some(cell) = self.get_mut(region) {
                cell.add_player(occupant.entity);
            }
        }
    }

    /// Drop the occupant from the cells around `previous` matching `filter`
    /// that actually contain it, pushing a despawn scoped to each.
    fn despawn_from(
        &mut self,
        outbox: &mut Outbox,
        occupant: &Occupant,
        previous: Option<RegionId>,
        filter: impl Fn(RegionId) -> bool,
    ) -> Vec<RegionId> {
        let Some(previous) = previous else {
            return Vec::new();
        };

        if occupant.kind.is_player() {
            if let Some(cell) = self.get_mut(previous) {
                cell.remove_player(occupant.entity);
            }
        }

        let mut despawned = Vec::new();

        for surrounding in self.surrounding(previous) {
            if !filter(surrounding) {
                continue;
            }

            let Some(cell) = self.get_mut(surrounding) else {
                continue;
            };

            if cell.remove_entity(occupant.entity) {
                despawned.push(surrounding);
            }
        }

        for &region in &despawned {
            outbox.push(
                self,
                PushScope::Region(region),
                Some(occupant.entity),
                Packet::Despawn {
                    instance: occupant.instance,
                },
            );
        }

        despawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn occupant(raw: u32, kind: EntityKind, x: u32, y: u32) -> Occupant {
        Occupant {
            entity: Entity::from_raw(raw),
            instance: Instance(raw as u64),
            kind,
            position: Position::new(x, y),
        }
    }

    fn members(grid: &RegionGrid, entity: Entity) -> BTreeSet<RegionId> {
        grid.iter()
            .filter(|(_, region)| region.has_entity(entity))
            .map(|(id, _)| id)
            .collect()
    }

    #[test]
    fn test_first_handle_assigns_region() {
        let mut grid = RegionGrid::build(64, 64, 16);
        let mut outbox = Outbox::default();
        let mob = occupant(1, EntityKind::Mob, 20, 20);
        let mut membership = RegionMembership::default();

        let transition = grid.handle(&mut outbox, &mob, &mut membership).unwrap();

        assert_eq!(transition.region, Some(5));
        assert!(transition.despawned.is_empty());
        assert!(!transition.entering);
        assert_eq!(membership.region, Some(5));
        assert_eq!(members(&grid, mob.entity), grid.surrounding(5).into_iter().collect());
        assert!(grid.get(5).unwrap().is_joining());
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_same_region_is_not_a_transition() {
        let mut grid = RegionGrid::build(64, 64, 16);
        let mut outbox = Outbox::default();
        let mut mob = occupant(1, EntityKind::Mob, 20, 20);
        let mut membership = RegionMembership::default();

        grid.handle(&mut outbox, &mob, &mut membership);
        grid.get_mut(5).unwrap().clear_joining();

        mob.position = Position::new(30, 30);
        assert!(grid.handle(&mut outbox, &mob, &mut membership).is_none());
        assert!(!grid.get(5).unwrap().is_joining());
    }

    #[test]
    fn test_transition_despawns_exact_difference() {
        let mut grid = RegionGrid::build(64, 64, 16);
        let mut outbox = Outbox::default();

        for (from, to) in [(0usize, 15usize), (5, 6), (0, 1), (10, 0), (3, 12)] {
            let side = grid.side_length();
            let at = |r: usize| {
                Position::new((r % side) as u32 * 16 + 1, (r / side) as u32 * 16 + 1)
            };

            let mut mover = occupant(7, EntityKind::Npc, 0, 0);
            mover.position = at(from);
            let mut membership = RegionMembership::default();
            grid.handle(&mut outbox, &mover, &mut membership);

            mover.position = at(to);
            let transition = grid.handle(&mut outbox, &mover, &mut membership).unwrap();

            let before: BTreeSet<_> = grid.surrounding(from).into_iter().collect();
            let after: BTreeSet<_> = grid.surrounding(to).into_iter().collect();
            let expected: BTreeSet<_> = before.difference(&after).copied().collect();

            let despawned: BTreeSet<_> = transition.despawned.iter().copied().collect();
            assert_eq!(despawned.len(), transition.despawned.len(), "duplicate despawn");
            assert_eq!(despawned, expected, "{from} -> {to}");
            assert_eq!(membership.old_regions, transition.despawned);
            assert_eq!(members(&grid, mover.entity), after, "{from} -> {to}");

            grid.remove(&mut outbox, &mover, &mut membership);
            assert!(members(&grid, mover.entity).is_empty());
            for region in 0..grid.len() {
                grid.get_mut(region).unwrap().clear_joining();
            }
        }
    }

    #[test]
    fn test_despawn_pushed_to_players_of_old_regions() {
        let mut grid = RegionGrid::build(64, 64, 16);
        let mut outbox = Outbox::default();

        let watcher = occupant(1, EntityKind::Player, 1, 1);
        let mut watcher_membership = RegionMembership::default();
        grid.handle(&mut outbox, &watcher, &mut watcher_membership);

        let mut mob = occupant(2, EntityKind::Mob, 17, 1);
        let mut mob_membership = RegionMembership::default();
        grid.handle(&mut outbox, &mob, &mut mob_membership);
        assert!(outbox.is_empty());

        // Region 1 -> region 3: region 0 no longer sees the mob.
        mob.position = Position::new(49, 1);
        let transition = grid.handle(&mut outbox, &mob, &mut mob_membership).unwrap();
        assert!(transition.despawned.contains(&0));

        let sent = outbox.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, watcher.entity);
        assert_eq!(sent[0].packet, Packet::Despawn { instance: Instance(2) });
    }

    #[test]
    fn test_player_home_region_tracking() {
        let mut grid = RegionGrid::build(64, 64, 16);
        let mut outbox = Outbox::default();
        let mut player = occupant(1, EntityKind::Player, 1, 1);
        let mut membership = RegionMembership::default();

        let transition = grid.handle(&mut outbox, &player, &mut membership).unwrap();
        assert!(transition.entering);
        assert!(grid.get(0).unwrap().has_player(player.entity));

        player.position = Position::new(40, 40);
        grid.handle(&mut outbox, &player, &mut membership);
        assert!(!grid.get(0).unwrap().has_player(player.entity));
        assert!(grid.get(10).unwrap().has_player(player.entity));

        // The player never receives its own despawn.
        assert!(outbox.iter().all(|o| o.recipient != player.entity));
    }

    #[test]
    fn test_remove_unassigned_is_noop() {
        let mut grid = RegionGrid::build(64, 64, 16);
        let mut outbox = Outbox::default();
        let mob = occupant(1, EntityKind::Mob, 1, 1);
        let mut membership = RegionMembership::default();

        assert!(grid.remove(&mut outbox, &mob, &mut membership).is_empty());
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_remove_returns_all_member_regions() {
        let mut grid = RegionGrid::build(64, 64, 16);
        let mut outbox = Outbox::default();
        let mob = occupant(1, EntityKind::Item, 20, 20);
        let mut membership = RegionMembership::default();
        grid.handle(&mut outbox, &mob, &mut membership);

        let removed: BTreeSet<_> = grid
            .remove(&mut outbox, &mob, &mut membership)
            .into_iter()
            .collect();

        assert_eq!(removed, grid.surrounding(5).into_iter().collect());
        assert_eq!(membership.region, None);
        assert!(grid.remove(&mut outbox, &mob, &mut membership).is_empty());
    }

    #[test]
    fn test_leaving_the_map_removes() {
        let mut grid = RegionGrid::build(32, 32, 16);
        let mut outbox = Outbox::default();
        let mut mob = occupant(1, EntityKind::Mob, 1, 1);
        let mut membership = RegionMembership::default();
        grid.handle(&mut outbox, &mob, &mut membership);

        mob.position = Position::new(100, 1);
        let transition = grid.handle(&mut outbox, &mob, &mut membership).unwrap();
        assert_eq!(transition.region, None);
        assert_eq!(transition.despawned.len(), 4);
        assert!(grid.handle(&mut outbox, &mob, &mut membership).is_none());
    }

    #[test]
    fn test_empty_grid_never_assigns() {
        let mut grid = RegionGrid::build(33, 32, 16);
        let mut outbox = Outbox::default();
        let mob = occupant(1, EntityKind::Mob, 1, 1);
        let mut membership = RegionMembership::default();

        assert!(grid.handle(&mut outbox, &mob, &mut membership).is_none());
        assert_eq!(membership.region, None);
    }
}
