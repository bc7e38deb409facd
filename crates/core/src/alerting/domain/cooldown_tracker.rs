use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::shared::camera_id::CameraId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub camera_id: CameraId,
    pub person_name: String,
}

impl CooldownKey {
    pub fn new(camera_id: CameraId, person_name: impl Into<String>) -> Self {
        Self {
            camera_id,
            person_name: person_name.into(),
        }
    }
}

/// An alert slot taken by [`CooldownTracker::try_acquire`]. Hand it back to
/// [`CooldownTracker::release`] when the alert could not be delivered.
#[derive(Debug)]
pub struct CooldownGrant {
    key: CooldownKey,
    at: SystemTime,
    previous: Option<SystemTime>,
}

/// Last-alert timestamps per (camera, person).
///
/// The check and the update happen under one lock, so two callers racing
/// on the same key can never both be granted an alert inside one window.
pub struct CooldownTracker {
    window: Duration,
    last_alert: Mutex<HashMap<CooldownKey, SystemTime>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_alert: Mutex::new(HashMap::new()),
        }
    }

    /// Grants an alert for `key` at `at` unless one was granted within the
    /// window. A granted alert starts a new window.
    ///
    /// A timestamp earlier than the last granted alert (results arrive out
    /// of order from the worker pool) counts as inside the window.
    pub fn try_acquire(&self, key: &CooldownKey, at: SystemTime) -> Option<CooldownGrant> {
        let mut last_alert = self.last_alert.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = last_alert.get(key) {
            let inside = match at.duration_since(*previous) {
                Ok(elapsed) => elapsed < self.window,
                Err(_) => true,
            };
            if inside {
                return None;
            }
        }
        let previous = last_alert.insert(key.clone(), at);
        Some(CooldownGrant {
            key: key.clone(),
            at,
            previous,
        })
    }

    /// Undoes a grant whose alert was never delivered, reopening the window
    /// it started. A no-op once a later grant has replaced it.
    pub fn release(&self, grant: CooldownGrant) {
        let mut last_alert = self.last_alert.lock().unwrap_or_else(|e| e.into_inner());
        if last_alert.get(&grant.key) != Some(&grant.at) {
            return;
        }
        match grant.previous {
            Some(previous) => last_alert.insert(grant.key, previous),
            None => last_alert.remove(&grant.key),
        };
    }

    pub fn last_alert(&self, key: &CooldownKey) -> Option<SystemTime> {
        self.last_alert
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }
}
