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

//! Conversions from the imperial units a station uploads to the metric units we publish.

/// Unit conversion applied to a single raw station field.
///
/// Every conversion is a pure function of its input and never fails. Results are
/// rounded to two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// Value is already in the unit we publish (humidity, UV index, solar radiation).
    Identity,
    FahrenheitToCelsius,
    InchesMercuryToHectopascals,
    MilesPerHourToKilometersPerHour,
    InchesToMillimeters,
}

impl Converter {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Identity => round2(value),
            Self::FahrenheitToCelsius => fahrenheit_to_celsius(value),
            Self::InchesMercuryToHectopascals => inhg_to_hpa(value),
            Self::MilesPerHourToKilometersPerHour => mph_to_kmh(value),
            Self::InchesToMillimeters => inches_to_mm(value),
        }
    }
}

const HPA_PER_INHG: f64 = 33.8639;
const KMH_PER_MPH: f64 = 1.60934;
const MM_PER_INCH: f64 = 25.4;

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    round2((f - 32.0) * 5.0 / 9.0)
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    round2(inhg * HPA_PER_INHG)
}

pub fn mph_to_kmh(mph: f64) -> f64 {
    round2(mph * KMH_PER_MPH)
}

pub fn inches_to_mm(inches: f64) -> f64 {
    round2(inches * MM_PER_INCH)
}

/// Round to two decimal places, halves away from zero.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
