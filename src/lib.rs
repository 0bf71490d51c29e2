pub mod api;
pub mod pipeline;

use std::path::PathBuf;

/// Root used for relative settings paths when no `--app-root` is given.
pub fn default_app_root_from_manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}
