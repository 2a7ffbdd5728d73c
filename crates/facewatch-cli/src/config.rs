use facewatch_core::cache::DEFAULT_CACHE_FILE;
use facewatch_core::builder::DEFAULT_FACES_DIR;
use facewatch_core::match_loop::DEFAULT_MATCH_THRESHOLD;
use facewatch_core::MatchPolicy;
use facewatch_hw::{CameraSettings, Monitor};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings for both subcommands.
///
/// Resolved as defaults, then the TOML file, then `FACEWATCH_*` variables;
/// command-line flags are applied last by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Encoding cache written by `build` and read by `watch`.
    pub cache_path: PathBuf,
    pub build: BuildConfig,
    pub camera: CameraConfig,
    pub matching: MatchingConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Root of the `<Name>/<image>` tree.
    pub faces_dir: PathBuf,
    /// Extraction threads; 0 uses every core.
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Index (`0`) or path (`/dev/video0`).
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Maximum Euclidean distance for a match.
    pub threshold: f32,
    pub policy: MatchPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Index into the detected monitor list.
    pub monitor: usize,
    /// Fixed monitor geometry; skips the xrandr query when set.
    pub geometry: Option<PinnedMonitor>,
    pub padding: i32,
    pub font: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PinnedMonitor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PinnedMonitor {
    pub fn to_monitor(self) -> Monitor {
        Monitor {
            name: "pinned".into(),
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: facewatch_core::default_model_dir(),
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            build: BuildConfig::default(),
            camera: CameraConfig::default(),
            matching: MatchingConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            faces_dir: PathBuf::from(DEFAULT_FACES_DIR),
            workers: 0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        let settings = CameraSettings::default();
        Self {
            device: "0".into(),
            width: settings.width,
            height: settings.height,
            read_timeout_ms: settings.read_timeout.as_millis() as u64,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            policy: MatchPolicy::default(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            monitor: 0,
            geometry: None,
            padding: facewatch_ui::DEFAULT_PADDING,
            font: Some(PathBuf::from(DEFAULT_FONT)),
        }
    }
}

impl CameraConfig {
    pub fn settings(&self) -> CameraSettings {
        CameraSettings {
            width: self.width,
            height: self.height,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            ..CameraSettings::default()
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override settings from `FACEWATCH_*` variables found by `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEWATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEWATCH_CACHE") {
            self.cache_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEWATCH_FACES_DIR") {
            self.build.faces_dir = PathBuf::from(v);
        }
        env_parse(&lookup, "FACEWATCH_WORKERS", &mut self.build.workers);
        if let Some(v) = lookup("FACEWATCH_CAMERA") {
            self.camera.device = v;
        }
        env_parse(&lookup, "FACEWATCH_CAMERA_WIDTH", &mut self.camera.width);
        env_parse(&lookup, "FACEWATCH_CAMERA_HEIGHT", &mut self.camera.height);
        env_parse(&lookup, "FACEWATCH_READ_TIMEOUT_MS", &mut self.camera.read_timeout_ms);
        env_parse(&lookup, "FACEWATCH_THRESHOLD", &mut self.matching.threshold);
        env_parse(&lookup, "FACEWATCH_POLICY", &mut self.matching.policy);
        env_parse(&lookup, "FACEWATCH_MONITOR", &mut self.overlay.monitor);
        env_parse(&lookup, "FACEWATCH_PADDING", &mut self.overlay.padding);
        if let Some(v) = lookup("FACEWATCH_FONT") {
            self.overlay.font = (!v.is_empty()).then(|| PathBuf::from(v));
        }
    }
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring invalid environment override"),
    }
}
