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

use crate::observation::Observation;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

pub const NAMESPACE: &str = "weatherstation";

pub const TARGET_STATE: &str = "state";
pub const TARGET_DISCOVERY: &str = "discovery";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FieldLabels {
    field: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TargetLabels {
    target: String,
}

/// Holder for metrics that are updated as uploads arrive and are published.
///
/// All metrics are created and registered upon call to `BridgeMetrics::new()`. Metrics
/// share the prefix "weatherstation_" when registered with a registry created by
/// [`BridgeMetrics::registry`].
#[derive(Debug, Clone, Default)]
pub struct BridgeMetrics {
    observation: Family<FieldLabels, Gauge<f64, AtomicU64>>,
    uploads: Counter,
    publish_failures: Family<TargetLabels, Counter>,
}

impl BridgeMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register(
            "observation",
            "Latest value of each numeric field, in metric units",
            metrics.observation.clone(),
        );
        reg.register("uploads", "Station uploads received", metrics.uploads.clone());
        reg.register(
            "publish_failures",
            "Failed attempts to publish to the MQTT broker",
            metrics.publish_failures.clone(),
        );

        metrics
    }

    /// Registry with the common metric prefix.
    pub fn registry() -> Registry {
        Registry::with_prefix(NAMESPACE)
    }

    /// Set gauges from each numeric field of the observation.
    ///
    /// Fields missing from the observation keep their previous value.
    pub fn observe(&self, obs: &Observation) {
        self.uploads.inc();
        for (field, reading) in obs.iter() {
            if let Some(v) = reading.as_number() {
                self.observation
                    .get_or_create(&FieldLabels { field: field.to_owned() })
                    .set(v);
            }
        }
    }

    pub fn publish_failed(&self, target: &str) {
        self.publish_failures
            .get_or_create(&TargetLabels {
                target: target.to_owned(),
            })
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::{BridgeMetrics, TARGET_STATE};
    use crate::observation::{normalize, raw_params};
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_observe_sets_numeric_fields() {
        let mut reg = BridgeMetrics::registry();
        let metrics = BridgeMetrics::new(&mut reg);

        let res = normalize(&raw_params(vec![("tempf", "68"), ("winddir", "90")]));
        metrics.observe(&res.observation);
        metrics.publish_failed(TARGET_STATE);

        let mut buf = String::new();
        encode(&mut buf, &reg).unwrap();

        assert!(buf.contains(r#"weatherstation_observation{field="temperature"} 20"#));
        assert!(buf.contains(r#"weatherstation_observation{field="wind_bearing"} 90"#));
        assert!(!buf.contains("wind_dir_cardinal"));
        assert!(buf.contains("weatherstation_uploads_total 1"));
        assert!(buf.contains(r#"weatherstation_publish_failures_total{target="state"} 1"#));
    }
}
