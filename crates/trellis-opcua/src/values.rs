// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Buffered value propagation.
//!
//! Value events bypass the structural lock entirely. With a buffer time of
//! zero each change is applied to its variable immediately; otherwise the
//! latest value per property is kept and a background loop applies the
//! batch every `buffer_time`:
//!
//! ```text
//!  set_value ──► ValueChangeBuffer (latest per property) ──tick──► variables
//! ```
//!
//! A property whose variable has been removed in the meantime is dropped
//! silently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use trellis_core::{PropertyKey, Value};

use crate::address_space::AddressSpace;

#[derive(Debug, Clone)]
struct PendingValue {
    value: Value,
    changed_at: DateTime<Utc>,
}

/// Latest pending value per property.
#[derive(Debug, Default)]
pub struct ValueChangeBuffer {
    pending: Mutex<HashMap<PropertyKey, PendingValue>>,
}

impl ValueChangeBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change, replacing any pending value of the same property.
    pub fn push(&self, key: PropertyKey, value: Value, changed_at: DateTime<Utc>) {
        self.pending
            .lock()
            .insert(key, PendingValue { value, changed_at });
    }

    /// Drops the pending value of one property.
    ///
    /// Returns `true` if a value was pending.
    pub fn discard(&self, key: &PropertyKey) -> bool {
        self.pending.lock().remove(key).is_some()
    }

    /// Returns the number of properties with a pending value.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Applies every pending value to its variable.
    ///
    /// Returns the number of variables updated.
    pub fn flush_into(&self, space: &AddressSpace) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return 0;
        }
        let total = pending.len();
        let applied = pending
            .into_iter()
            .filter(|(key, change)| space.update_value(key, change.value.clone(), change.changed_at))
            .count();
        trace!(total, applied, "Value buffer flushed");
        applied
    }

    /// Drops every pending value.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

// =============================================================================
// Flush loop
// =============================================================================

/// Background task applying buffered values on a fixed period.
pub(crate) struct FlushLoop {
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl FlushLoop {
    /// Spawns the loop on the current runtime.
    pub fn start(buffer: Arc<ValueChangeBuffer>, space: Arc<AddressSpace>, period: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let shutdown = shutdown.clone();
            let running = running.clone();
            tokio::spawn(async move {
                info!(interval_ms = period.as_millis() as u64, "Value flush loop started");
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if !running.load(Ordering::SeqCst) {
                                break;
                            }
                            buffer.flush_into(&space);
                        }
                        _ = shutdown.notified() => {
                            buffer.flush_into(&space);
                            break;
                        }
                    }
                }
                running.store(false, Ordering::SeqCst);
                debug!("Value flush loop stopped");
            })
        };

        Self {
            shutdown,
            running,
            handle,
        }
    }

    /// Stops the loop after a final flush and waits for it to exit.
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}
