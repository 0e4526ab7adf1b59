use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::telegram::DEFAULT_API_BASE;
use crate::debounce::{DebounceConfig, DEFAULT_CONSECUTIVE_CLEAR_FRAMES};
use crate::ingest::CameraSpec;

const DEFAULT_MODEL_PATH: &str = "bestyolo.onnx";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_CAMERA: &str = "0";
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_FRAME_DELAY_MS: u64 = 100;
const DEFAULT_COOLDOWN_SECS: u64 = 10;
const DEFAULT_SNAPSHOT_PATH: &str = "smoke_detected.jpg";
const DEFAULT_TELEGRAM_TIMEOUT_SECS: u64 = 15;
const DRY_RUN_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Every environment variable the loader reads.
pub const ENV_KEYS: &[&str] = &[
    "SMOKEWATCH_CONFIG",
    "MODEL_PATH",
    "USE_GPU",
    "MODEL_INPUT_SIZE",
    "BOT_TOKEN",
    "CHAT_ID",
    "TELEGRAM_API_BASE",
    "CONFIDENCE_THRESHOLD",
    "CONSECUTIVE_FRAMES_THRESHOLD",
    "COOLDOWN_SECS",
    "CAMERA_SOURCE",
    "ESP32CAM_IP",
    "FETCH_TIMEOUT_SECS",
    "RETRY_DELAY_SECS",
    "FRAME_DELAY_MS",
    "SNAPSHOT_PATH",
    "SMOKEWATCH_LOG_FILE",
];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SmokewatchConfigFile {
    model: Option<ModelConfigFile>,
    telegram: Option<TelegramConfigFile>,
    detection: Option<DetectionConfigFile>,
    camera: Option<CameraConfigFile>,
    alert: Option<AlertConfigFile>,
    log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    use_gpu: Option<bool>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TelegramConfigFile {
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    consecutive_clear_frames: Option<u32>,
    cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    source: Option<String>,
    fetch_timeout_secs: Option<u64>,
    retry_delay_secs: Option<u64>,
    frame_delay_ms: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertConfigFile {
    snapshot_path: Option<PathBuf>,
}

/// Fully resolved daemon configuration. Built once at startup.
#[derive(Debug, Clone)]
pub struct SmokewatchConfig {
    pub model: ModelSettings,
    pub telegram: TelegramSettings,
    pub detection: DetectionSettings,
    pub camera: CameraSettings,
    pub snapshot_path: PathBuf,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub use_gpu: bool,
    pub input_size: u32,
}

#[derive(Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Unset until a file or `CONFIDENCE_THRESHOLD` provides it; `validate`
    /// rejects a missing value.
    pub confidence_threshold: Option<f32>,
    pub consecutive_clear_frames: u32,
    pub cooldown: Duration,
}

impl DetectionSettings {
    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            cooldown: self.cooldown,
            consecutive_clear_frames: self.consecutive_clear_frames,
        }
    }

    /// Validated threshold. Only `None` before `validate` has run.
    pub fn threshold(&self) -> f32 {
        self.confidence_threshold.unwrap_or(f32::INFINITY)
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub source: String,
    pub fetch_timeout: Duration,
    pub retry_delay: Duration,
    pub frame_delay: Duration,
    pub width: u32,
    pub height: u32,
}

impl SmokewatchConfig {
    /// Load `.env`, the optional JSON file named by `SMOKEWATCH_CONFIG`, then
    /// environment overrides, and validate the result.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::resolve()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like `load`, but notification credentials are optional and the
    /// threshold falls back to 0.5. Dry runs log alerts instead of sending
    /// them.
    pub fn load_for_dry_run() -> Result<Self> {
        let mut cfg = Self::resolve()?;
        cfg.detection
            .confidence_threshold
            .get_or_insert(DRY_RUN_CONFIDENCE_THRESHOLD);
        cfg.validate_detection()?;
        Ok(cfg)
    }

    /// Log file setting from `SMOKEWATCH_LOG_FILE` or the config file,
    /// read before `load` so configuration errors reach the same log.
    /// An unreadable config file yields `None` here; `load` reports it.
    pub fn resolve_log_file() -> Option<PathBuf> {
        let _ = dotenvy::dotenv();
        if let Some(path) = env_nonempty("SMOKEWATCH_LOG_FILE") {
            return Some(PathBuf::from(path));
        }
        let config_path = env_nonempty("SMOKEWATCH_CONFIG")?;
        read_config_file(Path::new(&config_path)).ok()?.log_file
    }

    fn resolve() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(anyhow!("failed to read .env: {}", err));
            }
        }
        let config_path = std::env::var("SMOKEWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: SmokewatchConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        let telegram = file.telegram.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();

        Self {
            model: ModelSettings {
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                use_gpu: model.use_gpu.unwrap_or(true),
                input_size: model.input_size.unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
            },
            telegram: TelegramSettings {
                bot_token: telegram.bot_token.unwrap_or_default(),
                chat_id: telegram.chat_id.unwrap_or_default(),
                api_base: telegram
                    .api_base
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                timeout: Duration::from_secs(DEFAULT_TELEGRAM_TIMEOUT_SECS),
            },
            detection: DetectionSettings {
                confidence_threshold: detection.confidence_threshold,
                consecutive_clear_frames: detection
                    .consecutive_clear_frames
                    .unwrap_or(DEFAULT_CONSECUTIVE_CLEAR_FRAMES),
                cooldown: Duration::from_secs(
                    detection.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS),
                ),
            },
            camera: CameraSettings {
                source: camera
                    .source
                    .unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
                fetch_timeout: Duration::from_secs(
                    camera
                        .fetch_timeout_secs
                        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
                ),
                retry_delay: Duration::from_secs(
                    camera.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
                ),
                frame_delay: Duration::from_millis(
                    camera.frame_delay_ms.unwrap_or(DEFAULT_FRAME_DELAY_MS),
                ),
                width: camera.width.unwrap_or(DEFAULT_FRAME_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            },
            snapshot_path: alert
                .snapshot_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            log_file: file.log_file,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(flag) = env_nonempty("USE_GPU") {
            self.model.use_gpu = parse_flag(&flag);
        }
        if let Some(size) = env_nonempty("MODEL_INPUT_SIZE") {
            self.model.input_size = size
                .parse()
                .map_err(|_| anyhow!("MODEL_INPUT_SIZE must be a positive integer"))?;
        }
        if let Some(token) = env_nonempty("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = env_nonempty("CHAT_ID") {
            self.telegram.chat_id = chat_id;
        }
        if let Some(api_base) = env_nonempty("TELEGRAM_API_BASE") {
            self.telegram.api_base = api_base;
        }
        if let Some(threshold) = env_nonempty("CONFIDENCE_THRESHOLD") {
            let value: f32 = threshold
                .parse()
                .map_err(|_| anyhow!("CONFIDENCE_THRESHOLD must be a number in (0, 1)"))?;
            self.detection.confidence_threshold = Some(value);
        }
        if let Some(frames) = env_nonempty("CONSECUTIVE_FRAMES_THRESHOLD") {
            self.detection.consecutive_clear_frames = frames.parse().map_err(|_| {
                anyhow!("CONSECUTIVE_FRAMES_THRESHOLD must be a positive integer")
            })?;
        }
        if let Some(secs) = env_nonempty("COOLDOWN_SECS") {
            self.detection.cooldown = Duration::from_secs(
                secs.parse()
                    .map_err(|_| anyhow!("COOLDOWN_SECS must be an integer number of seconds"))?,
            );
        }
        if let Some(ip) = env_nonempty("ESP32CAM_IP") {
            self.camera.source = format!("http://{}", ip);
        }
        if let Some(source) = env_nonempty("CAMERA_SOURCE") {
            self.camera.source = source;
        }
        if let Some(secs) = env_nonempty("FETCH_TIMEOUT_SECS") {
            self.camera.fetch_timeout = Duration::from_secs(secs.parse().map_err(|_| {
                anyhow!("FETCH_TIMEOUT_SECS must be an integer number of seconds")
            })?);
        }
        if let Some(secs) = env_nonempty("RETRY_DELAY_SECS") {
            self.camera.retry_delay = Duration::from_secs(secs.parse().map_err(|_| {
                anyhow!("RETRY_DELAY_SECS must be an integer number of seconds")
            })?);
        }
        if let Some(ms) = env_nonempty("FRAME_DELAY_MS") {
            self.camera.frame_delay = Duration::from_millis(ms.parse().map_err(|_| {
                anyhow!("FRAME_DELAY_MS must be an integer number of milliseconds")
            })?);
        }
        if let Some(path) = env_nonempty("SNAPSHOT_PATH") {
            self.snapshot_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("SMOKEWATCH_LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() || self.telegram.chat_id.trim().is_empty() {
            return Err(anyhow!("BOT_TOKEN and CHAT_ID must be set"));
        }
        self.validate_detection()
    }

    /// Checks that do not involve the notification credentials.
    pub fn validate_detection(&mut self) -> Result<()> {
        let threshold = self
            .detection
            .confidence_threshold
            .ok_or_else(|| anyhow!("CONFIDENCE_THRESHOLD must be set"))?;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(anyhow!(
                "confidence threshold must be in (0, 1), got {}",
                threshold
            ));
        }
        if self.detection.consecutive_clear_frames == 0 {
            return Err(anyhow!("consecutive clear frames must be at least 1"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.camera.fetch_timeout.is_zero() {
            return Err(anyhow!("fetch timeout must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("frame size must be non-zero"));
        }
        CameraSpec::parse(&self.camera.source)?;
        Ok(())
    }

    pub fn camera_spec(&self) -> Result<CameraSpec> {
        CameraSpec::parse(&self.camera.source)
    }
}

fn read_config_file(path: &Path) -> Result<SmokewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// `true`, `1` and `yes` (any case) enable a flag; anything else disables it.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
