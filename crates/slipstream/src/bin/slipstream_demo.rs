//! # SLIPSTREAM Demo
//!
//! Headless server and scripted drivers on the loopback network.
//!
//! ```bash
//! # Stock settings
//! slipstream_demo
//!
//! # From a config file, with replication logs
//! RUST_LOG=slipstream_net=debug slipstream_demo crates/slipstream/config/demo.toml
//! ```

use slipstream::{DemoConfig, RaceMatch};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DemoConfig::load(&path),
        None => Ok(DemoConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(error) => {
            eprintln!("✗ {error}");
            std::process::exit(1);
        }
    };

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    SLIPSTREAM DEMO");
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  Drivers:    {}", config.clients);
    println!("  Ticks:      {} @ {} Hz", config.ticks, config.server.tick_rate);
    println!("  Link:       {:?}", config.link.conditions());
    println!();

    let mut race = match RaceMatch::new(&config) {
        Ok(race) => race,
        Err(error) => {
            eprintln!("✗ {error}");
            std::process::exit(1);
        }
    };
    let summary = race.run(config.ticks);

    println!("  Frames:             {}", summary.frames);
    println!("  Server entities:    {}", summary.server_entities);
    println!("  Mirrored entities:  {:?}", summary.mirrored_entities);
    println!("  Connected drivers:  {}", summary.connected_drivers);
    println!("  Snapshots sent:     {}", summary.snapshots_sent);
    println!("  Events sent:        {}", summary.events_sent);
    println!("  Dropped updates:    {}", summary.clients.dropped_updates);
    println!("  Duplicate events:   {}", summary.clients.duplicate_events);
    println!("  Protocol errors:    {}", summary.protocol_errors);
    println!(
        "  Server traffic:     {} msgs / {} bytes out",
        summary.transport.messages_sent, summary.transport.bytes_sent
    );

    let consistent = summary
        .mirrored_entities
        .iter()
        .all(|&count| count == summary.server_entities);
    if consistent {
        println!("  ✓ every mirror matches the server");
    } else {
        println!("  ✗ mirrors diverge from the server");
        std::process::exit(2);
    }
}
