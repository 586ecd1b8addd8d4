//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "lot-north", "campus-a")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "parkwatch".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted backend's REST surface
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    /// Credentials used by the service binary to sign in
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_backend_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Topic prefix the backend mirrors watched records under
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_topic_prefix() -> String {
    "parkwatch".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Interval of the drift-reconciliation poll (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Capacity of the merged event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Capacity of the outbound write channel
    #[serde(default = "default_write_buffer")]
    pub write_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            event_buffer: default_event_buffer(),
            write_buffer: default_write_buffer(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_event_buffer() -> usize {
    256
}

fn default_write_buffer() -> usize {
    64
}

/// Backend paths of the records the session watches and writes.
///
/// `notification` and `status_mirror` are realtime-tree paths; the rest are
/// document paths or collection names.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentPaths {
    #[serde(default = "default_presence_doc")]
    pub presence: String,
    #[serde(default = "default_status_doc")]
    pub status: String,
    #[serde(default = "default_status_mirror")]
    pub status_mirror: String,
    #[serde(default = "default_sensor_doc")]
    pub sensor: String,
    #[serde(default = "default_notification_path")]
    pub notification: String,
    #[serde(default = "default_gate_doc")]
    pub gate: String,
    #[serde(default = "default_requests_collection")]
    pub requests: String,
    #[serde(default = "default_slots_collection")]
    pub slots: String,
    #[serde(default = "default_vehicles_collection")]
    pub vehicles: String,
    #[serde(default = "default_messages_collection")]
    pub messages: String,
}

impl Default for DocumentPaths {
    fn default() -> Self {
        Self {
            presence: default_presence_doc(),
            status: default_status_doc(),
            status_mirror: default_status_mirror(),
            sensor: default_sensor_doc(),
            notification: default_notification_path(),
            gate: default_gate_doc(),
            requests: default_requests_collection(),
            slots: default_slots_collection(),
            vehicles: default_vehicles_collection(),
            messages: default_messages_collection(),
        }
    }
}

fn default_presence_doc() -> String {
    "detection/primary".to_string()
}

fn default_status_doc() -> String {
    "detection/status".to_string()
}

fn default_status_mirror() -> String {
    "status".to_string()
}

fn default_sensor_doc() -> String {
    "detection/ultrasonic".to_string()
}

fn default_notification_path() -> String {
    "notifications/waiting".to_string()
}

fn default_gate_doc() -> String {
    "gate/state".to_string()
}

fn default_requests_collection() -> String {
    "requests".to_string()
}

fn default_slots_collection() -> String {
    "parkings".to_string()
}

fn default_vehicles_collection() -> String {
    "vehicles".to_string()
}

fn default_messages_collection() -> String {
    "messages".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub backend: BackendConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub documents: DocumentPaths,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    backend_base_url: String,
    backend_api_key: Option<String>,
    backend_timeout_ms: u64,
    backend_email: Option<String>,
    backend_password: Option<String>,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic_prefix: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    poll_interval_secs: u64,
    event_buffer: usize,
    write_buffer: usize,
    documents: DocumentPaths,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            backend_base_url: "http://localhost:9090".to_string(),
            backend_api_key: None,
            backend_timeout_ms: default_backend_timeout_ms(),
            backend_email: None,
            backend_password: None,
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_topic_prefix: default_topic_prefix(),
            mqtt_username: None,
            mqtt_password: None,
            poll_interval_secs: default_poll_interval_secs(),
            event_buffer: default_event_buffer(),
            write_buffer: default_write_buffer(),
            documents: DocumentPaths::default(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            backend_base_url: toml_config.backend.base_url,
            backend_api_key: toml_config.backend.api_key,
            backend_timeout_ms: toml_config.backend.timeout_ms,
            backend_email: toml_config.backend.email,
            backend_password: toml_config.backend.password,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic_prefix: toml_config.mqtt.topic_prefix,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            poll_interval_secs: toml_config.session.poll_interval_secs,
            event_buffer: toml_config.session.event_buffer,
            write_buffer: toml_config.session.write_buffer,
            documents: toml_config.documents,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Resolve the config path from CONFIG_FILE or the default location
    pub fn resolve_config_path() -> String {
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }
        "config/dev.toml".to_string()
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn backend_base_url(&self) -> &str {
        &self.backend_base_url
    }

    pub fn backend_api_key(&self) -> Option<&str> {
        self.backend_api_key.as_deref()
    }

    pub fn backend_timeout_ms(&self) -> u64 {
        self.backend_timeout_ms
    }

    pub fn backend_email(&self) -> Option<&str> {
        self.backend_email.as_deref()
    }

    pub fn backend_password(&self) -> Option<&str> {
        self.backend_password.as_deref()
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic_prefix(&self) -> &str {
        &self.mqtt_topic_prefix
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    pub fn write_buffer(&self) -> usize {
        self.write_buffer
    }

    pub fn documents(&self) -> &DocumentPaths {
        &self.documents
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
