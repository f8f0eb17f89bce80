use serde_derive::{Deserialize, Serialize};
use spindle::{Architecture, EngineSettings};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 6000;

#[derive(Serialize, Deserialize)]
pub struct Server {
    pub address: Option<String>,
    pub max_clients: u16,
    pub nodelay: bool,
}

#[derive(Serialize, Deserialize)]
pub struct Game {
    /// Game-loop sleep per tick in milliseconds; negative means spin.
    pub tick_ms: i64,
}

#[derive(Serialize, Deserialize)]
pub struct GameConfig {
    pub server: Server,
    pub game: Game,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            server: Server {
                address: Some(format!("0.0.0.0:{}", DEFAULT_PORT)),
                max_clients: 1000,
                nodelay: true,
            },
            game: Game { tick_ms: 1 },
        }
    }
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> GameConfig {
        serdeconv::from_toml_file(path).expect("Error loading game configuration file")
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            bind: self
                .server
                .address
                .clone()
                .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_PORT)),
            max_clients: self.server.max_clients,
            nodelay: self.server.nodelay,
            architecture: Architecture::Centralized,
        }
    }
}
