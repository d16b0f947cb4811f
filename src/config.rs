//! Configuration tree, TOML-backed, with one default fn per field so a
//! partial config file still fills in sane values for everything it
//! omits. Cameras are an operator-supplied list rather than a fixed set.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::CameraConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NexGuardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub webrtc: WebRtcConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_ip: default_bind_ip(),
            web_port: default_web_port(),
        }
    }
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_web_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    #[serde(default = "default_img_subdir")]
    pub storage_img_subdir: String,
    #[serde(default = "default_video_subdir")]
    pub storage_video_subdir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            storage_dir: default_storage_dir(),
            storage_img_subdir: default_img_subdir(),
            storage_video_subdir: default_video_subdir(),
        }
    }
}

fn default_storage_dir() -> String {
    "./storage".to_string()
}
fn default_img_subdir() -> String {
    "images".to_string()
}
fn default_video_subdir() -> String {
    "videos".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetectionConfig {
    #[serde(default = "default_fps")]
    pub default_fps: u32,
    #[serde(default = "default_width")]
    pub default_width: u32,
    #[serde(default = "default_height")]
    pub default_height: u32,
    #[serde(default = "default_buffer_size")]
    pub default_buffer_size: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_cooldown")]
    pub detection_cooldown_seconds: f64,
    #[serde(default = "default_leading")]
    pub clip_leading_seconds: f64,
    #[serde(default = "default_trailing")]
    pub clip_trailing_seconds: f64,
    #[serde(default = "default_recordable_classes")]
    pub recordable_classes: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_alert_notifications: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            default_fps: default_fps(),
            default_width: default_width(),
            default_height: default_height(),
            default_buffer_size: default_buffer_size(),
            min_confidence: default_min_confidence(),
            detection_cooldown_seconds: default_cooldown(),
            clip_leading_seconds: default_leading(),
            clip_trailing_seconds: default_trailing(),
            recordable_classes: default_recordable_classes(),
            enable_alert_notifications: true,
        }
    }
}

fn default_fps() -> u32 {
    15
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_buffer_size() -> usize {
    10
}
fn default_min_confidence() -> f32 {
    0.5
}
fn default_cooldown() -> f64 {
    30.0
}
fn default_leading() -> f64 {
    5.0
}
fn default_trailing() -> f64 {
    30.0
}
fn default_recordable_classes() -> Vec<String> {
    vec!["person".to_string()]
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebRtcConfig {
    /// Comma-separated STUN/TURN URLs.
    #[serde(default = "default_ice_servers")]
    pub ice_servers: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        WebRtcConfig {
            ice_servers: default_ice_servers(),
        }
    }
}

fn default_ice_servers() -> String {
    "stun:stun.l.google.com:19302".to_string()
}

impl WebRtcConfig {
    pub fn ice_server_urls(&self) -> Vec<String> {
        self.ice_servers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl NexGuardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let config: NexGuardConfig =
            toml::from_str(&content).context("failed to parse config file")?;
        Ok(config)
    }
}

impl Default for NexGuardConfig {
    fn default() -> Self {
        NexGuardConfig {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            detection: DetectionConfig::default(),
            webrtc: WebRtcConfig::default(),
            cameras: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = NexGuardConfig::default();
        assert_eq!(config.detection.default_fps, 15);
        assert_eq!(config.detection.min_confidence, 0.5);
        assert_eq!(config.detection.detection_cooldown_seconds, 30.0);
        assert_eq!(config.detection.recordable_classes, vec!["person"]);
    }

    #[test]
    fn ice_servers_split_on_comma() {
        let cfg = WebRtcConfig {
            ice_servers: "stun:a.example:3478, stun:b.example:3478".to_string(),
        };
        assert_eq!(
            cfg.ice_server_urls(),
            vec!["stun:a.example:3478", "stun:b.example:3478"]
        );
    }
}
