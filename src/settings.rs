use crate::capture::types::{
    CaptureTarget, Resolution, DEFAULT_FRAME_RATE, DEFAULT_JPEG_QUALITY, DEFAULT_SAMPLE_PERIOD,
};
use crate::shared::paths::{ensure_dir, get_settings_path};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;
const MAX_FRAME_RATE: u32 = 120;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,
    #[serde(default = "default_ideal_frame_rate")]
    pub ideal_frame_rate: u32,
    #[serde(default = "default_true")]
    pub pause_when_hidden: bool,
    #[serde(default = "default_ffmpeg_input_format")]
    pub ffmpeg_input_format: String,
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_sample_period_ms() -> u64 {
    DEFAULT_SAMPLE_PERIOD.as_millis() as u64
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_ideal_width() -> u32 {
    Resolution::HD.width
}

fn default_ideal_height() -> u32 {
    Resolution::HD.height
}

fn default_ideal_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg_input_format() -> String {
    "mjpeg".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            sample_period_ms: default_sample_period_ms(),
            jpeg_quality: default_jpeg_quality(),
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            ideal_frame_rate: default_ideal_frame_rate(),
            pause_when_hidden: true,
            ffmpeg_input_format: default_ffmpeg_input_format(),
        }
    }
}

impl AppSettings {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms.max(1))
    }

    pub fn capture_target(&self) -> CaptureTarget {
        CaptureTarget {
            resolution: Resolution::new(self.ideal_width, self.ideal_height),
            frame_rate: self.ideal_frame_rate,
        }
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Load settings from disk, returning default if file doesn't exist or is invalid
pub fn load_settings() -> AppSettings {
    let path = get_settings_path();

    if !path.exists() {
        tracing::info!(target: "system", "[SETTINGS] Settings file not found, writing defaults");
        let settings = AppSettings::default();
        if let Err(e) = save_settings(&settings) {
            tracing::warn!(target: "system", "[SETTINGS] Failed to write default settings: {}", e);
        }
        return settings;
    }

    match load_settings_from_file(&path) {
        Ok(settings) => {
            tracing::info!(target: "system", "[SETTINGS] Settings loaded from {:?}", path);
            settings
        }
        Err(e) => {
            tracing::warn!(target: "system", "[SETTINGS] Failed to load settings: {}, using defaults", e);
            AppSettings::default()
        }
    }
}

pub fn load_settings_from_file(path: &Path) -> Result<AppSettings, SettingsError> {
    let contents = std::fs::read_to_string(path)?;
    let settings: AppSettings = serde_json::from_str(&contents)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &AppSettings) -> Result<(), SettingsError> {
    if !(1..=100).contains(&settings.jpeg_quality) {
        return Err(SettingsError::Invalid(format!(
            "jpegQuality must be between 1 and 100, got {}",
            settings.jpeg_quality
        )));
    }
    if !(1..=MAX_WIDTH).contains(&settings.ideal_width)
        || !(1..=MAX_HEIGHT).contains(&settings.ideal_height)
    {
        return Err(SettingsError::Invalid(format!(
            "idealWidth/idealHeight must be within {}x{}, got {}x{}",
            MAX_WIDTH, MAX_HEIGHT, settings.ideal_width, settings.ideal_height
        )));
    }
    if !(1..=MAX_FRAME_RATE).contains(&settings.ideal_frame_rate) {
        return Err(SettingsError::Invalid(format!(
            "idealFrameRate must be between 1 and {}, got {}",
            MAX_FRAME_RATE, settings.ideal_frame_rate
        )));
    }
    if settings.sample_period_ms == 0 {
        return Err(SettingsError::Invalid("samplePeriodMs must be positive".to_string()));
    }
    if !settings.server_url.starts_with("http://")
        && !settings.server_url.starts_with("https://")
        && !settings.server_url.starts_with("ws://")
        && !settings.server_url.starts_with("wss://")
    {
        return Err(SettingsError::Invalid(format!(
            "serverUrl has an unsupported scheme: {}",
            settings.server_url
        )));
    }
    Ok(())
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) -> Result<(), SettingsError> {
    save_settings_to_file(settings, &get_settings_path())
}

pub fn save_settings_to_file(settings: &AppSettings, path: &Path) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }

    let contents = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, contents)?;

    tracing::info!(target: "system", "[SETTINGS] Settings saved to {:?}", path);
    Ok(())
}
