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

//! Map a wind bearing in degrees to a point on a 16-point compass rose.

const POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
];

const DEGREES_PER_POINT: f64 = 22.5;

/// Return the compass point nearest to `degrees`.
///
/// Any real number is accepted, values outside `[0, 360)` wrap around. Boundaries
/// between two points (e.g. 11.25) resolve to the clockwise point since the index is
/// computed as `floor(degrees / 22.5 + 0.5)`. Non-finite input maps to "N".
pub fn cardinal(degrees: f64) -> &'static str {
    let index = (degrees / DEGREES_PER_POINT + 0.5).floor();
    if !index.is_finite() {
        return POINTS[0];
    }

    POINTS[index.rem_euclid(POINTS.len() as f64) as usize]
}
