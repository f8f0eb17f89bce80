use clap::{App, Arg};
use keel::logging;
use keel::shutdown::Coordinator;
use keel::time::timestamp_secs;
use signal_hook::consts::{SIGINT, SIGTERM};
use spindle::IoEngine;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use taverncore::config::GameConfig;
use taverncore::server::GameServer;

const GAME_CFG_NAME: &str = "game_config.toml";
const LOG_CFG_NAME: &str = "tavernrunner.log.toml";

const KILL_SWITCH_POLL_MS: u64 = 100;

fn main() {
    let matches = App::new("Tavern Server")
        .version("0.1.0")
        .author("Tavern Works")
        .about("Runs the mini-game lobby server.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file")
                .required(false),
        )
        .get_matches();

    let config = match matches.value_of("CONFIG_FILE") {
        Some(path) => GameConfig::load(path),
        None if Path::new(GAME_CFG_NAME).exists() => GameConfig::load(GAME_CFG_NAME),
        None => GameConfig::default(),
    };

    let logger = if Path::new(LOG_CFG_NAME).exists() {
        logging::init_from_file(LOG_CFG_NAME)
    } else {
        logging::init()
    };

    logging::info!(
        logger,
        "starting tavern server";
        "max_clients" => config.server.max_clients,
        "tick_ms" => config.game.tick_ms,
        "started_at" => timestamp_secs()
    );

    let coordinator = Arc::new(Coordinator::new());

    let engine = Arc::new(
        IoEngine::new(config.engine_settings(), &logger).expect("Error creating the network engine"),
    );
    engine.start().expect("Error starting the network engine");

    let mut game = GameServer::new(Arc::clone(&engine), config.game.tick_ms, &logger);
    game.start().expect("Error starting the game loop");

    // SIGINT/SIGTERM flip the kill switch; the watcher relays it to the
    // coordinator the main thread is parked on.
    let kill_switch = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&kill_switch))
        .expect("Error registering SIGTERM handler");
    signal_hook::flag::register(SIGINT, Arc::clone(&kill_switch))
        .expect("Error registering SIGINT handler");

    {
        let coordinator = Arc::clone(&coordinator);
        let watch_log = logger.new(logging::o!());
        thread::spawn(move || {
            while !kill_switch.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(KILL_SWITCH_POLL_MS));
            }
            logging::info!(watch_log, "shutdown signal received");
            coordinator.signal();
        });
    }

    coordinator.wait();

    game.stop();
    engine.stop();

    logging::info!(logger, "server shutdown complete");
}
