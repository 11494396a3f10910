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

//! Holder for the most recent station upload, shared between the upload handler
//! and the dashboard.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Timestamp shown before the first upload has been received.
pub const WAITING: &str = "Waiting for data...";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Display values of the latest upload and the local time it was received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub timestamp: String,
    pub values: BTreeMap<String, String>,
}

impl Snapshot {
    /// Snapshot of `values` stamped with the current local time.
    pub fn now(values: BTreeMap<String, String>) -> Self {
        Snapshot {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            values,
        }
    }

    /// Snapshot used until the first upload arrives.
    pub fn waiting() -> Self {
        Snapshot {
            timestamp: WAITING.to_owned(),
            values: BTreeMap::new(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::waiting()
    }
}

/// Single process-wide [`Snapshot`], replaced wholesale on each upload.
///
/// Readers get a shared reference to an immutable snapshot so they can never see
/// the timestamp of one upload paired with the values of another. The lock is only
/// held long enough to swap or clone the pointer. Concurrent `set` calls are last
/// writer wins.
#[derive(Debug, Default)]
pub struct StateStore {
    current: RwLock<Arc<Snapshot>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        // A panic while holding the lock can't leave a partially written pointer.
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = snapshot;
    }

    pub fn get(&self) -> Arc<Snapshot> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
