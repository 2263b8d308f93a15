//! Configuration batching.
//!
//! Subscribe and unsubscribe deltas accumulate in the current batch until a
//! flush takes them. Each batch id owns a list of one-shot ack listeners;
//! taking a batch closes its id and opens the next one, so listeners added
//! after a flush wait for the following batch.

use std::collections::HashMap;

use ssegw_core::{ConfigurationRequest, SubscriptionConfig};

use crate::callbacks::AckListener;
use crate::errors::{ClientError, Result};

/// Accumulates configuration deltas and tracks per-batch ack listeners.
pub struct ConfigurationBatcher {
    batch_id: u64,
    subscribe: Vec<SubscriptionConfig>,
    unsubscribe: Vec<SubscriptionConfig>,
    ack_listeners: HashMap<u64, Vec<AckListener>>,
}

impl Default for ConfigurationBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBatcher {
    /// A batcher whose first batch has id 1.
    pub fn new() -> Self {
        let mut batcher = Self {
            batch_id: 0,
            subscribe: Vec::new(),
            unsubscribe: Vec::new(),
            ack_listeners: HashMap::new(),
        };
        batcher.advance();
        batcher
    }

    /// Id of the batch currently accumulating.
    pub fn current_batch_id(&self) -> u64 {
        self.batch_id
    }

    /// Whether the current batch has any delta.
    pub fn has_pending(&self) -> bool {
        !self.subscribe.is_empty() || !self.unsubscribe.is_empty()
    }

    /// Add a subscribe delta.
    pub fn queue_subscribe(&mut self, config: SubscriptionConfig) {
        self.subscribe.push(config);
    }

    /// Add an unsubscribe delta.
    pub fn queue_unsubscribe(&mut self, config: SubscriptionConfig) {
        self.unsubscribe.push(config);
    }

    /// Attach a one-shot listener to the current batch.
    pub fn add_ack_listener(&mut self, listener: AckListener) -> Result<()> {
        match self.ack_listeners.get_mut(&self.batch_id) {
            Some(listeners) => {
                listeners.push(listener);
                Ok(())
            }
            None => Err(ClientError::ObsoleteBatch {
                batch_id: self.batch_id,
            }),
        }
    }

    /// Number of listeners waiting on `batch_id`.
    pub fn ack_listener_count(&self, batch_id: u64) -> usize {
        self.ack_listeners.get(&batch_id).map_or(0, Vec::len)
    }

    /// Take the current batch for sending and open the next one.
    ///
    /// Returns `None`, leaving the batch open, when there is nothing to send.
    pub fn take_batch(&mut self, dispatcher_id: Option<String>) -> Option<(u64, ConfigurationRequest)> {
        if !self.has_pending() {
            return None;
        }
        let batch_id = self.batch_id;
        let request = ConfigurationRequest {
            subscribe: std::mem::take(&mut self.subscribe),
            unsubscribe: std::mem::take(&mut self.unsubscribe),
            dispatcher_id,
        };
        self.advance();
        Some((batch_id, request))
    }

    /// Remove and return the listeners for an acknowledged batch.
    ///
    /// Unknown or already acknowledged ids yield nothing. The caller runs the
    /// listeners outside any lock.
    pub fn acknowledge(&mut self, batch_id: u64) -> Vec<AckListener> {
        self.ack_listeners.remove(&batch_id).unwrap_or_default()
    }

    fn advance(&mut self) {
        self.batch_id += 1;
        let _ = self.ack_listeners.insert(self.batch_id, Vec::new());
    }
}

impl std::fmt::Debug for ConfigurationBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationBatcher")
            .field("batch_id", &self.batch_id)
            .field("subscribe", &self.subscribe.len())
            .field("unsubscribe", &self.unsubscribe.len())
            .field("awaiting_ack", &self.ack_listeners.len())
            .finish()
    }
}
