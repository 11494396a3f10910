// weatherstation2mqtt - Bridge Weather Underground style station uploads to MQTT
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Broker and discovery settings, editable from the dashboard and persisted as JSON.

use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

pub const DEFAULT_BROKER_HOST: &str = "192.168.1.100";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "home/weatherstation/state";
pub const DEFAULT_DEVICE_NAME: &str = "weatherstation2mqtt";

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, io::Error),
    Parse(serde_json::Error),
    InvalidPort(String, ParseIntError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            Self::Parse(e) => write!(f, "configuration document: {}", e),
            Self::InvalidPort(port, e) => write!(f, "invalid port {:?}: {}", port, e),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::InvalidPort(_, e) => Some(e),
        }
    }
}

/// Broker connection and Home Assistant discovery settings.
///
/// Field names in the persisted document are the `mqtt_*` names used by the
/// dashboard form. Keys missing from a persisted document keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(rename = "mqtt_broker")]
    pub broker_host: String,
    #[serde(rename = "mqtt_port")]
    pub broker_port: u16,
    #[serde(rename = "mqtt_user")]
    pub user: String,
    #[serde(rename = "mqtt_pass")]
    pub pass: String,
    #[serde(rename = "mqtt_topic")]
    pub topic: String,
    pub device_name: String,
    pub discovery_enabled: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            broker_host: DEFAULT_BROKER_HOST.to_owned(),
            broker_port: DEFAULT_BROKER_PORT,
            user: String::new(),
            pass: String::new(),
            topic: DEFAULT_TOPIC.to_owned(),
            device_name: DEFAULT_DEVICE_NAME.to_owned(),
            discovery_enabled: true,
        }
    }
}

impl Configuration {
    /// Parse a persisted document, overlaying the keys it contains on the defaults.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(doc).map_err(ConfigError::Parse)
    }

    /// Load a persisted document from `path` or fall back to the defaults.
    ///
    /// A missing document is expected on first start. A document that can't be
    /// read or parsed is logged and otherwise ignored.
    pub fn load(path: &Path) -> Self {
        let doc = match fs::read_to_string(path) {
            Ok(doc) => doc,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(message = "no saved configuration, using defaults", path = %path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::error!(message = "unable to read configuration, using defaults", error = %ConfigError::Io(path.to_owned(), e));
                return Self::default();
            }
        };

        match Self::from_json(&doc) {
            Ok(cfg) => {
                tracing::info!(message = "loaded configuration", path = %path.display());
                cfg
            }
            Err(e) => {
                tracing::error!(message = "unable to parse configuration, using defaults", path = %path.display(), error = %e);
                Self::default()
            }
        }
    }

    /// Write every field of this configuration to `path`, replacing any existing document.
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        let doc = serde_json::to_string_pretty(self).map_err(ConfigError::Parse)?;
        fs::write(path, doc).map_err(|e| ConfigError::Io(path.to_owned(), e))
    }

    /// Whether both a username and password were supplied.
    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty() && !self.pass.is_empty()
    }
}

/// Settings as submitted from the dashboard form.
///
/// Every field is optional in the request. Missing text fields become empty,
/// a missing or blank port is the default port, and discovery is only enabled by the
/// exact value `"true"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigForm {
    pub mqtt_broker: Option<String>,
    pub mqtt_port: Option<String>,
    pub mqtt_topic: Option<String>,
    pub mqtt_user: Option<String>,
    pub mqtt_pass: Option<String>,
    pub device_name: Option<String>,
    pub discovery_enabled: Option<String>,
}

impl TryFrom<ConfigForm> for Configuration {
    type Error = ConfigError;

    fn try_from(form: ConfigForm) -> Result<Self, Self::Error> {
        let broker_port = match form.mqtt_port {
            Some(p) if !p.trim().is_empty() => p.trim().parse().map_err(|e| ConfigError::InvalidPort(p.clone(), e))?,
            _ => DEFAULT_BROKER_PORT,
        };

        Ok(Configuration {
            broker_host: form.mqtt_broker.unwrap_or_default(),
            broker_port,
            user: form.mqtt_user.unwrap_or_default(),
            pass: form.mqtt_pass.unwrap_or_default(),
            topic: form.mqtt_topic.unwrap_or_default(),
            device_name: form.device_name.unwrap_or_default(),
            discovery_enabled: form.discovery_enabled.as_deref() == Some("true"),
        })
    }
}

/// Current [`Configuration`] of the process and the document it is persisted to.
#[derive(Debug)]
pub struct ConfigModel {
    path: PathBuf,
    current: RwLock<Configuration>,
    // Serializes saves so the document on disk matches the last in-memory replacement.
    saving: Mutex<()>,
}

impl ConfigModel {
    pub fn new<P: Into<PathBuf>>(path: P, cfg: Configuration) -> Self {
        ConfigModel {
            path: path.into(),
            current: RwLock::new(cfg),
            saving: Mutex::new(()),
        }
    }

    /// Load the document at `path` (or defaults) and keep it as the current configuration.
    pub fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let cfg = Configuration::load(&path);
        Self::new(path, cfg)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current configuration.
    ///
    /// Callers get a consistent copy of every field even if a save happens while
    /// they are using it.
    pub fn get(&self) -> Configuration {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the current configuration and persist it.
    ///
    /// The in-memory configuration is replaced even if persisting it fails.
    pub fn save(&self, cfg: Configuration) -> Result<(), ConfigError> {
        let _guard = self.saving.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = cfg.clone();
        }

        cfg.persist(&self.path)?;
        tracing::info!(message = "saved configuration", path = %self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ConfigForm, ConfigModel, Configuration};
    use std::fs;
    use tempfile::TempDir;

    fn custom() -> Configuration {
        Configuration {
            broker_host: "mqtt.example.com".to_owned(),
            broker_port: 8883,
            user: "station".to_owned(),
            pass: "secret".to_owned(),
            topic: "weather/backyard".to_owned(),
            device_name: "Backyard Station".to_owned(),
            discovery_enabled: false,
        }
    }

    #[test]
    fn test_load_missing_document_is_default() {
        let dir = TempDir::new().unwrap();
        let cfg = Configuration::load(&dir.path().join("config.json"));
        assert_eq!(Configuration::default(), cfg);
    }

    #[test]
    fn test_load_corrupt_document_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ this is not json").unwrap();

        assert_eq!(Configuration::default(), Configuration::load(&path));
    }

    #[test]
    fn test_load_wrong_type_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"mqtt_broker": "other", "mqtt_port": "not a number"}"#).unwrap();

        assert_eq!(Configuration::default(), Configuration::load(&path));
    }

    #[test]
    fn test_load_partial_document_merges() {
        let cfg = Configuration::from_json(r#"{"mqtt_broker": "10.0.0.5", "discovery_enabled": false, "extra": 1}"#)
            .unwrap();

        assert_eq!("10.0.0.5", cfg.broker_host);
        assert!(!cfg.discovery_enabled);
        assert_eq!(Configuration::default().broker_port, cfg.broker_port);
        assert_eq!(Configuration::default().topic, cfg.topic);
        assert_eq!(Configuration::default().device_name, cfg.device_name);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let model = ConfigModel::load(&path);
        model.save(custom()).unwrap();

        assert_eq!(custom(), model.get());
        assert_eq!(custom(), Configuration::load(&path));
        assert_eq!(custom(), ConfigModel::load(&path).get());
    }

    #[test]
    fn test_persisted_document_uses_form_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        custom().persist(&path).unwrap();

        let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!("mqtt.example.com", doc["mqtt_broker"]);
        assert_eq!(8883, doc["mqtt_port"]);
        assert_eq!("station", doc["mqtt_user"]);
        assert_eq!("secret", doc["mqtt_pass"]);
        assert_eq!("weather/backyard", doc["mqtt_topic"]);
        assert_eq!("Backyard Station", doc["device_name"]);
        assert_eq!(false, doc["discovery_enabled"]);
    }

    #[test]
    fn test_save_failure_still_updates_memory() {
        let dir = TempDir::new().unwrap();
        let model = ConfigModel::new(dir.path().join("missing").join("config.json"), Configuration::default());

        let res = model.save(custom());
        assert!(matches!(res, Err(ConfigError::Io(_, _))));
        assert_eq!(custom(), model.get());
    }

    #[test]
    fn test_form_full() {
        let form = ConfigForm {
            mqtt_broker: Some("mqtt.example.com".to_owned()),
            mqtt_port: Some("8883".to_owned()),
            mqtt_topic: Some("weather/backyard".to_owned()),
            mqtt_user: Some("station".to_owned()),
            mqtt_pass: Some("secret".to_owned()),
            device_name: Some("Backyard Station".to_owned()),
            discovery_enabled: Some("false".to_owned()),
        };

        assert_eq!(custom(), Configuration::try_from(form).unwrap());
    }

    #[test]
    fn test_form_missing_fields() {
        let cfg = Configuration::try_from(ConfigForm::default()).unwrap();
        assert_eq!("", cfg.broker_host);
        assert_eq!(1883, cfg.broker_port);
        assert_eq!("", cfg.topic);
        assert!(!cfg.discovery_enabled);
    }

    #[test]
    fn test_form_discovery_enabled_exact_match() {
        let form = ConfigForm {
            discovery_enabled: Some("true".to_owned()),
            ..Default::default()
        };
        assert!(Configuration::try_from(form).unwrap().discovery_enabled);

        let form = ConfigForm {
            discovery_enabled: Some("yes".to_owned()),
            ..Default::default()
        };
        assert!(!Configuration::try_from(form).unwrap().discovery_enabled);
    }

    #[test]
    fn test_form_blank_port_is_default() {
        for port in ["", "  "] {
            let form = ConfigForm {
                mqtt_broker: Some("b".to_owned()),
                mqtt_port: Some(port.to_owned()),
                ..Default::default()
            };

            let cfg = Configuration::try_from(form).unwrap();
            assert_eq!(1883, cfg.broker_port);
            assert_eq!("b", cfg.broker_host);
        }
    }

    #[test]
    fn test_form_invalid_port() {
        let form = ConfigForm {
            mqtt_port: Some("eighteen".to_owned()),
            ..Default::default()
        };

        assert!(matches!(
            Configuration::try_from(form),
            Err(ConfigError::InvalidPort(_, _))
        ));
    }

    #[test]
    fn test_has_credentials() {
        assert!(custom().has_credentials());
        assert!(!Configuration::default().has_credentials());

        let mut cfg = custom();
        cfg.pass = String::new();
        assert!(!cfg.has_credentials());
    }
}
