use std::path::PathBuf;

use veriface_core::EngineConfig;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Engine tunables (upload limit, threshold, face size).
    pub engine: EngineConfig,
    /// Path to the SQLite embedding database.
    pub db_path: PathBuf,
    /// Path to the learned detector model file.
    pub model_path: PathBuf,
}

impl Config {
    /// Load configuration from `VERIFACE_*` environment variables with
    /// defaults under the XDG data directory.
    pub fn from_env() -> Self {
        Self {
            engine: EngineConfig::from_env(),
            db_path: veriface_core::config::db_path_from_env(),
            model_path: veriface_core::config::model_path_from_env(),
        }
    }
}
