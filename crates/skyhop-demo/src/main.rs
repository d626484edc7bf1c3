//! Headless demo: several peers replicate their avatars over an in-process
//! hub, each simulating its own copy of a small level.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p skyhop-demo -- --peers 3 --seconds 10`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use glam::Vec2;
use skyhop_config::{CliArgs, Config};
use skyhop_sync::{
    ArenaPhysics, InputFrame, InputSource, LoopbackHub, PeerEndpoint, PeerId, PeerSession,
    Physics, RecordingPresenter, ScriptedInput, SessionError, SnapshotFaults,
};
use tracing::{error, info};

/// Presentation frame length (60 Hz).
const FRAME: Duration = Duration::from_micros(16_667);

#[derive(Parser, Debug)]
#[command(name = "skyhop-demo", about = "Run several replicated peers headless")]
struct DemoArgs {
    #[command(flatten)]
    cli: CliArgs,

    /// Number of peers on the hub.
    #[arg(long, default_value_t = 3)]
    peers: u32,

    /// Simulated run time in seconds.
    #[arg(long, default_value_t = 10.0)]
    seconds: f32,

    /// Fraction of snapshots dropped in transit.
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f32,
}

/// Ground from x = -10 to 10 with a hazard strip on the right.
fn build_level(config: &Config) -> ArenaPhysics {
    let mut world = ArenaPhysics::new(config.world.gravity);
    world.add_ground(Vec2::new(-10.0, -1.0), Vec2::new(10.0, 0.0));
    world.add_hazard(Vec2::new(3.0, 0.0), Vec2::new(4.0, 0.2));
    world
}

/// Each peer gets a different routine so every path is exercised: walking
/// into the hazard, walking off the edge, and jumping then respawning.
fn script_for(index: u32) -> ScriptedInput {
    let idle = InputFrame::default();
    let right = InputFrame {
        horizontal: 1.0,
        ..idle
    };
    let left = InputFrame {
        horizontal: -1.0,
        ..idle
    };
    let jump = InputFrame {
        vertical: 1.0,
        ..idle
    };
    let respawn = InputFrame {
        respawn: true,
        ..idle
    };
    match index % 3 {
        0 => ScriptedInput::default()
            .hold(idle, 30)
            .hold(right, 90)
            .hold(jump, 1)
            .hold(right, 60)
            .hold(idle, 1),
        1 => ScriptedInput::default()
            .hold(idle, 30)
            .hold(left, 240)
            .hold(idle, 1),
        _ => ScriptedInput::default()
            .hold(idle, 30)
            .hold(jump, 1)
            .hold(idle, 120)
            .hold(respawn, 1)
            .hold(idle, 1),
    }
}

struct Node {
    session: PeerSession<PeerEndpoint>,
    world: ArenaPhysics,
    input: ScriptedInput,
}

fn run(args: &DemoArgs, config: &Config) -> Result<(), SessionError> {
    let hub = LoopbackHub::new();
    let faults = SnapshotFaults {
        drop_rate: args.drop_rate,
        seed: 42,
        ..SnapshotFaults::default()
    };

    let mut nodes = Vec::new();
    for index in 0..args.peers.max(1) {
        let peer = PeerId(index + 1);
        let nickname = format!("{}-{}", config.network.nickname, peer.0);
        let endpoint = hub.join_with_faults(peer, nickname, faults);
        let mut node = Node {
            session: PeerSession::new(endpoint, config.clone()),
            world: build_level(config),
            input: script_for(index),
        };
        node.session.spawn_local(&mut node.world)?;
        nodes.push(node);
    }
    info!("{} peers joined the hub", hub.peer_count());

    let frames = (args.seconds.max(0.0) / FRAME.as_secs_f32()).ceil() as u64;
    let mut snapshots = 0u64;
    let mut events = 0u64;
    for _ in 0..frames {
        for node in &mut nodes {
            let input = node.input.poll();
            let stats = node.session.frame(&mut node.world, &input, FRAME)?;
            snapshots += u64::from(stats.snapshots_sent);
            events += u64::from(stats.events_broadcast);
        }
    }
    info!(frames, snapshots, events, "simulation finished");

    for node in &nodes {
        let mut presenter = RecordingPresenter::new();
        node.session.present(&mut presenter);
        let viewer = node.session.local_peer();
        for avatar in node.session.avatars() {
            let position = node.world.position(avatar.body());
            let health = presenter
                .get(avatar.id())
                .map(|p| p.health_label.clone())
                .unwrap_or_default();
            info!(
                viewer = viewer.0,
                owner = avatar.owner().0,
                name = avatar.name(),
                x = position.x,
                y = position.y,
                "{health}"
            );
        }
    }
    Ok(())
}

fn main() {
    let args = DemoArgs::parse();

    let config_dir: PathBuf = args
        .cli
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.cli);
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    let log_dir = config_dir.join("logs");
    skyhop_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&args, &config) {
        error!("demo failed: {e}");
        std::process::exit(1);
    }
}
