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

//! Home Assistant MQTT discovery announcements for every field we publish.
//!
//! Announcements are a function of the configuration only. The full catalog is
//! announced whether or not a station has ever sent a particular field.

use crate::config::Configuration;
use serde::Serialize;

pub const DEFAULT_PREFIX: &str = "homeassistant";

const MODEL: &str = "weatherstation2mqtt";
const MANUFACTURER: &str = "liftylol";
const PLATFORM: &str = "mqtt";

/// Static description of one sensor entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub suffix: &'static str,
    pub field: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
}

const fn sensor(
    suffix: &'static str,
    field: &'static str,
    name: &'static str,
    unit: Option<&'static str>,
    device_class: Option<&'static str>,
) -> SensorDescriptor {
    SensorDescriptor {
        suffix,
        field,
        name,
        unit,
        device_class,
    }
}

pub const CATALOG: [SensorDescriptor; 12] = [
    sensor("temp", "temperature", "Temperature", Some("°C"), Some("temperature")),
    sensor("hum", "humidity", "Humidity", Some("%"), Some("humidity")),
    sensor("press", "pressure", "Pressure", Some("hPa"), Some("pressure")),
    sensor("dew", "dew_point", "Dew Point", Some("°C"), Some("temperature")),
    sensor("wind_s", "wind_speed", "Wind Speed", Some("km/h"), Some("wind_speed")),
    sensor("wind_g", "wind_gust", "Wind Gust", Some("km/h"), Some("wind_speed")),
    sensor("wind_d", "wind_bearing", "Wind Direction", Some("°"), None),
    sensor("wind_txt", "wind_dir_cardinal", "Wind Direction (Text)", None, None),
    sensor("rain_r", "rain_rate", "Rain Rate", Some("mm/h"), Some("precipitation_intensity")),
    sensor("rain_d", "rain_daily", "Rain Daily", Some("mm"), Some("precipitation")),
    sensor("uv", "uv_index", "UV Index", None, None),
    sensor("solar", "solar_rad", "Solar Radiation", Some("W/m²"), Some("irradiance")),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: &'static str,
    pub manufacturer: &'static str,
}

/// Body of a discovery config message for a single sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryPayload {
    pub name: &'static str,
    pub unique_id: String,
    pub state_topic: String,
    pub value_template: String,
    pub device: Device,
    pub platform: &'static str,
    #[serde(rename = "unit_of_measurement", skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
}

/// Discovery payload and the topic it must be published (retained) to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub topic: String,
    pub payload: DiscoveryPayload,
}

/// Identifier derived from a device name: lowercase with spaces replaced by underscores.
pub fn slug(device_name: &str) -> String {
    device_name.to_lowercase().replace(' ', "_")
}

/// Build one announcement per catalog entry for the given configuration.
pub fn announcements(cfg: &Configuration, prefix: &str) -> Vec<Announcement> {
    let id = slug(&cfg.device_name);

    CATALOG
        .iter()
        .map(|s| Announcement {
            topic: format!("{}/sensor/{}/{}/config", prefix, id, s.suffix),
            payload: DiscoveryPayload {
                name: s.name,
                unique_id: format!("{}_{}", id, s.suffix),
                state_topic: cfg.topic.clone(),
                value_template: format!("{{{{ value_json.{} }}}}", s.field),
                device: Device {
                    identifiers: vec![id.clone()],
                    name: cfg.device_name.clone(),
                    model: MODEL,
                    manufacturer: MANUFACTURER,
                },
                platform: PLATFORM,
                unit: s.unit,
                device_class: s.device_class,
            },
        })
        .collect()
}
