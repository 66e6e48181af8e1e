//! Walkthrough of the region index: a player joins, a mob walks into view
//! and back out, and a tree is cut.
//!
//! Run with: RUST_LOG=debug cargo run --example region_demo

use region_sync::{
    DynamicArea, Instance, Packet, Progress, Requirement, SyncConfig, SyncWorld, TileMap, Tree,
    TreeId,
};
use region_sync::systems::region_data_to_json;

fn main() {
    env_logger::init();

    println!("=== Region Sync - Demo ===\n");

    let mut map = TileMap::new(64, 64);
    map.data.iter_mut().for_each(|tile| *tile = 1);
    map.set_tile(40, 40, 77);

    let bridge = DynamicArea::new(1, 4, 4, 2, 1)
        .with_requirement(Requirement::Quest("bridge".to_string()))
        .mapped_to(40, 40);
    let index = map.coord_to_index(8, 8);
    let tree = Tree::new(1, vec![(index, 300)], vec![(index, 301)]);

    let config = SyncConfig {
        refresh_interval: 4,
        ..Default::default()
    };

    let mut sim = match SyncWorld::new(config, map, vec![bridge], vec![tree]) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("Failed to build region index: {err}");
            return;
        }
    };

    let player = Instance(1);
    let mob = Instance(2);

    sim.spawn_player(player.0, 1, 1, Progress::default());
    sim.spawn_mob(mob.0, 40, 1);

    println!("--- Tick 1: player joins ---");
    sim.step();
    print_deliveries(&mut sim);

    println!("\n--- Mob walks toward the player ---");
    if let Err(err) = sim.set_destination(mob, 20, 1) {
        eprintln!("{err}");
    }
    for _ in 0..20 {
        sim.step();
        print_deliveries(&mut sim);
    }

    println!("\n--- Mob teleports away ---");
    if let Err(err) = sim.move_entity(mob, 60, 60) {
        eprintln!("{err}");
    }
    sim.step();
    print_deliveries(&mut sim);

    println!("\n--- Player completes the bridge quest ---");
    if let Err(err) = sim.complete_quest(player, "bridge") {
        eprintln!("{err}");
    }
    // Next refresh tick picks the mapped tiles up.
    for _ in 0..4 {
        sim.step();
        print_deliveries(&mut sim);
    }

    println!("\n--- Tree is cut ---");
    sim.cut_tree(TreeId(1));
    print_deliveries(&mut sim);

    println!("\n=== Final State (JSON) ===\n");
    match sim.snapshot().to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("{err}"),
    }
}

fn print_deliveries(sim: &mut SyncWorld) {
    for delivery in sim.drain_deliveries() {
        let summary = match &delivery.packet {
            Packet::Map(data) => format!(
                "Map: {} regions, {} tiles, {} bytes",
                data.len(),
                data.values().map(Vec::len).sum::<usize>(),
                region_data_to_json(data).map(|json| json.len()).unwrap_or(0)
            ),
            packet => packet.to_json().unwrap_or_else(|_| "{}".to_string()),
        };

        println!("  [tick {}] -> {:?}: {summary}", sim.current_tick(), delivery.recipient);
    }
}
