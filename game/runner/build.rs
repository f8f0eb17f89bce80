use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILES: [&str; 2] = ["game_config.toml", "tavernrunner.log.toml"];

// OUT_DIR is <target>/<profile>/build/<pkg>-<hash>/out; the binaries land in
// <target>/<profile>.
fn profile_dir(out_dir: &str) -> PathBuf {
    Path::new(out_dir)
        .ancestors()
        .nth(3)
        .expect("OUT_DIR has no profile directory above it")
        .to_path_buf()
}

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();

    let source = Path::new(&manifest_dir).join("config");
    let target = profile_dir(&out_dir);

    for name in CONFIG_FILES.iter() {
        if let Err(err) = fs::copy(source.join(name), target.join(name)) {
            panic!("Failed to copy {}: {}", name, err);
        }
    }
}
