use std::env;
use std::fs;
use taverncore::config::GameConfig;

/// Emits the default configuration as TOML: to the path given as the first
/// argument, or to stdout without one.
fn main() {
    let toml = serdeconv::to_toml_string(&GameConfig::default())
        .expect("Default configuration failed to serialize");

    match env::args().nth(1) {
        Some(path) => fs::write(path, toml).expect("Failed to write config file"),
        None => print!("{}", toml),
    }
}
