//! Rover configuration – reads/writes `~/.rover/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use rover_perception::{CameraGeometry, ColorThresholds, MapConfig};
use rover_runtime::{ControlLoopConfig, DecisionConfig};
use rover_types::RoverError;
use serde::{Deserialize, Serialize};

/// Simulator settings used by `rover` when no real vehicle is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// `open`, `wall` or `sample`.
    pub scene: String,
    /// Cycles to run; `0` means until Ctrl-C.
    pub cycles: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scene: "open".to_string(),
            cycles: 200,
        }
    }
}

/// Persisted configuration stored in `~/.rover/config.toml`.
///
/// Every section and field is optional; missing values take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraGeometry,
    pub colors: ColorThresholds,
    pub decision: DecisionConfig,
    pub map: MapConfig,
    pub sim: SimConfig,
}

impl Config {
    /// The subset handed to the control loop.
    pub fn control_loop(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            camera: self.camera.clone(),
            colors: self.colors,
            map: self.map,
            decision: self.decision,
        }
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config at `path` and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RoverError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| RoverError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Load from `path`, or fall back to defaults (with overrides) when absent.
pub fn load_or_default(path: &Path) -> Result<Config, RoverError> {
    match load_from(path)? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_MAX_VEL` | `decision.max_vel` |
/// | `ROVER_THROTTLE_SET` | `decision.throttle_set` |
/// | `ROVER_BRAKE_SET` | `decision.brake_set` |
/// | `ROVER_STOP_FORWARD` | `decision.stop_forward` |
/// | `ROVER_GO_FORWARD` | `decision.go_forward` |
/// | `ROVER_WORLD_SIZE` | `map.world_size` |
pub fn apply_env_overrides(cfg: &mut Config) {
    override_from_env("ROVER_MAX_VEL", &mut cfg.decision.max_vel);
    override_from_env("ROVER_THROTTLE_SET", &mut cfg.decision.throttle_set);
    override_from_env("ROVER_BRAKE_SET", &mut cfg.decision.brake_set);
    override_from_env("ROVER_STOP_FORWARD", &mut cfg.decision.stop_forward);
    override_from_env("ROVER_GO_FORWARD", &mut cfg.decision.go_forward);
    override_from_env("ROVER_WORLD_SIZE", &mut cfg.map.world_size);
}

fn override_from_env<T: std::str::FromStr>(var: &str, field: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(parsed) = v.trim().parse::<T>()
    {
        *field = parsed;
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), RoverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RoverError::Config(format!("failed to create config directory: {e}")))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                RoverError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RoverError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| RoverError::Config(format!("failed to write {}: {e}", path.display()));
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
