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

//! Normalization of raw station uploads into canonical, metric observations.
//!
//! Stations send a query string with imperial values under vendor specific names
//! (e.g. `tempf=68.2&baromin=30.01`). The [`normalize`] function converts whatever
//! subset of recognized parameters was sent into an [`Observation`] keyed by canonical
//! field name plus a mapping of human readable labels to display strings for the
//! dashboard.

use crate::bearing;
use crate::units::Converter;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const WIND_BEARING: &str = "wind_bearing";
pub const WIND_DIR_CARDINAL: &str = "wind_dir_cardinal";

const RAW_WIND_DIR: &str = "winddir";
const WIND_DIRECTION_LABEL: &str = "Wind Direction";

/// Raw parameters of a station upload, name to all values sent for that name.
pub type RawParams = HashMap<String, Vec<String>>;

/// Group decoded query pairs by name, preserving the order values were sent in.
///
/// Blank values are skipped, `tempf=&tempf=68` is the same as `tempf=68`.
pub fn raw_params<I, K, V>(pairs: I) -> RawParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut params = RawParams::new();
    for (k, v) in pairs {
        let v = v.into();
        if !v.is_empty() {
            params.entry(k.into()).or_default().push(v);
        }
    }

    params
}

/// A recognized raw station parameter and how to turn it into a canonical field.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub raw: &'static str,
    pub canonical: &'static str,
    pub converter: Converter,
    pub unit: &'static str,
}

pub const FIELDS: [Field; 10] = [
    Field {
        raw: "tempf",
        canonical: "temperature",
        converter: Converter::FahrenheitToCelsius,
        unit: "°C",
    },
    Field {
        raw: "dewptf",
        canonical: "dew_point",
        converter: Converter::FahrenheitToCelsius,
        unit: "°C",
    },
    Field {
        raw: "baromin",
        canonical: "pressure",
        converter: Converter::InchesMercuryToHectopascals,
        unit: "hPa",
    },
    Field {
        raw: "windspeedmph",
        canonical: "wind_speed",
        converter: Converter::MilesPerHourToKilometersPerHour,
        unit: "km/h",
    },
    Field {
        raw: "windgustmph",
        canonical: "wind_gust",
        converter: Converter::MilesPerHourToKilometersPerHour,
        unit: "km/h",
    },
    Field {
        raw: "rainin",
        canonical: "rain_rate",
        converter: Converter::InchesToMillimeters,
        unit: "mm/h",
    },
    Field {
        raw: "dailyrainin",
        canonical: "rain_daily",
        converter: Converter::InchesToMillimeters,
        unit: "mm",
    },
    Field {
        raw: "humidity",
        canonical: "humidity",
        converter: Converter::Identity,
        unit: "%",
    },
    Field {
        raw: "UV",
        canonical: "uv_index",
        converter: Converter::Identity,
        unit: "",
    },
    Field {
        raw: "solarRadiation",
        canonical: "solar_rad",
        converter: Converter::Identity,
        unit: "W/m²",
    },
];

/// Value of a single canonical field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl Reading {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{}", DisplayNumber(*v)),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Canonical observation published to MQTT, serialized as a flat JSON object.
///
/// Only fields that were sent by the station and parsed as finite numbers are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Observation {
    values: BTreeMap<&'static str, Reading>,
}

impl Observation {
    pub fn get(&self, field: &str) -> Option<&Reading> {
        self.values.get(field)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Reading::as_number)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Reading)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    fn insert(&mut self, field: &'static str, reading: Reading) {
        self.values.insert(field, reading);
    }
}

/// Result of normalizing a single station upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub observation: Observation,
    /// Human readable label to display string, e.g. `"Dew Point" => "12.5 °C"`
    pub display: BTreeMap<String, String>,
}

/// Convert raw station parameters into a canonical observation.
///
/// Only the first value of each parameter is used. Parameters that are not recognized
/// are ignored and recognized parameters that don't parse as a finite number are
/// dropped. This never fails, bad input only results in fewer fields.
pub fn normalize(params: &RawParams) -> Normalized {
    let mut out = Normalized::default();

    for field in FIELDS.iter() {
        let value = match first_number(params, field.raw) {
            Some(v) => field.converter.apply(v),
            None => continue,
        };

        if !value.is_finite() {
            tracing::debug!(message = "dropping non-finite converted value", field = field.canonical);
            continue;
        }

        out.observation.insert(field.canonical, Reading::Number(value));
        out.display.insert(
            display_label(field.canonical),
            format!("{} {}", DisplayNumber(value), field.unit),
        );
    }

    if let Some(degrees) = first_number(params, RAW_WIND_DIR) {
        let point = bearing::cardinal(degrees);
        out.observation.insert(WIND_BEARING, Reading::Number(degrees));
        out.observation.insert(WIND_DIR_CARDINAL, Reading::Text(point.to_owned()));
        out.display.insert(
            WIND_DIRECTION_LABEL.to_owned(),
            format!("{} ({}°)", point, degrees.trunc() as i64),
        );
    }

    out
}

fn first_number(params: &RawParams, name: &str) -> Option<f64> {
    let raw = params.get(name)?.first()?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            tracing::debug!(message = "ignoring unparseable station value", param = name, value = %raw);
            None
        }
    }
}

/// Turn a canonical field name into a title-cased label, `dew_point` becomes `Dew Point`.
pub fn display_label(canonical: &str) -> String {
    canonical
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Formats a number so that integral values keep a trailing `.0` (`20.0` rather than `20`).
struct DisplayNumber(f64);

impl fmt::Display for DisplayNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 && self.0.abs() < 1e16 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
