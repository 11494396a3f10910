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

//! Bridge Weather Underground style station uploads to MQTT
//!
//! ## Features
//!
//! `weatherstation2mqtt` accepts observations from a personal weather station that uses the
//! Weather Underground upload protocol, converts them to metric units, and publishes them to
//! an MQTT broker as a single retained JSON document. Optionally, [Home Assistant MQTT discovery]
//! announcements are published so that each field shows up as a sensor without any manual setup.
//!
//! The following fields are published when the station sends them (not all stations send all fields).
//!
//! * `temperature` - Temperature, in degrees celsius.
//! * `dew_point` - Dew point, in degrees celsius.
//! * `pressure` - Barometric pressure, in hectopascals.
//! * `humidity` - Relative humidity (0-100).
//! * `wind_speed` - Wind speed, in km/h.
//! * `wind_gust` - Wind gust speed, in km/h.
//! * `wind_bearing` - Wind direction, in degrees as sent by the station.
//! * `wind_dir_cardinal` - Wind direction as a point on a 16-point compass (`N`, `NNE`, ...).
//! * `rain_rate` - Rain rate, in mm/h.
//! * `rain_daily` - Rain since midnight, in mm.
//! * `uv_index` - UV index.
//! * `solar_rad` - Solar radiation, in W/m².
//!
//! [Home Assistant MQTT discovery]: https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery
//!
//! ## Build
//!
//! `weatherstation2mqtt` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/weatherstation2mqtt.git && cd weatherstation2mqtt
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Station
//!
//! Point the "customized upload" (or Weather Underground) settings of your station at the host
//! running `weatherstation2mqtt`. Stations upload to the path `/weatherstation/updateweatherstation.php`
//! on port 80, which is where `weatherstation2mqtt` listens by default.
//!
//! ```text
//! ./weatherstation2mqtt --config /etc/weatherstation2mqtt/config.json
//! ```
//!
//! ### Dashboard
//!
//! Browse to the host running `weatherstation2mqtt` to see the latest upload and to change the broker
//! settings. Settings are saved to the configuration file and take effect immediately. Discovery
//! announcements are republished each time settings are saved with discovery enabled.
//!
//! The restart button exits the process with status `1`. Run `weatherstation2mqtt` under Systemd
//! (`Restart=on-failure`) or Docker (`restart: unless-stopped`) if you want it to come back.
//!
//! ### Prometheus
//!
//! The latest value of each numeric field is also exposed as Prometheus metrics at `/metrics`.
//!
//! * `weatherstation_observation{field=$FIELD}` - Latest value of each field, in metric units.
//! * `weatherstation_uploads_total` - Number of uploads received from the station.
//! * `weatherstation_publish_failures_total{target=$TARGET}` - Failed publishes, by `state` or `discovery`.
//!

pub mod bearing;
pub mod config;
pub mod dashboard;
pub mod discovery;
pub mod http;
pub mod metrics;
pub mod mqtt;
pub mod observation;
pub mod state;
pub mod units;
