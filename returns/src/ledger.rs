//! Settlement ledger keyed by payment id.
//!
//! Gateways and browsers both repeat requests: a reload, a back button, a
//! retried redirect. Only the first success arrival for a payment id settles
//! the order; the rest are recorded and otherwise ignored.
//!
//! Entries are kept for the retention window (at least as long as a gateway
//! session lives) and the ledger never holds more than its capacity; the
//! oldest entry goes first.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use reclaim_common::order::{OrderStatus, PaymentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// This arrival moved the order to `paid`.
    First,
    /// Already settled by an earlier arrival.
    Repeat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub status: OrderStatus,
    pub first_seen: DateTime<Utc>,
    pub arrivals: u32,
}

/// Hosted checkout sessions expire within a day.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;
pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug)]
pub struct ReconciliationLedger {
    entries: Mutex<HashMap<PaymentId, Settlement>>,
    retention: Duration,
    capacity: usize,
}

impl Default for ReconciliationLedger {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ReconciliationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Record a success arrival for `payment_id`.
    pub async fn settle(&self, payment_id: &PaymentId) -> Arrival {
        self.settle_at(payment_id, Utc::now()).await
    }

    async fn settle_at(&self, payment_id: &PaymentId, now: DateTime<Utc>) -> Arrival {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(payment_id) {
            self.make_room(&mut entries, now);
        }
        let entry = entries.entry(payment_id.clone()).or_insert_with(|| Settlement {
            status: OrderStatus::Pending,
            first_seen: now,
            arrivals: 0,
        });
        entry.arrivals += 1;
        if entry.status == OrderStatus::Paid {
            return Arrival::Repeat;
        }
        entry.status = OrderStatus::Paid;
        Arrival::First
    }

    fn make_room(&self, entries: &mut HashMap<PaymentId, Settlement>, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        let before = entries.len();
        entries.retain(|_, settlement| settlement.first_seen > cutoff);
        if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, settlement)| settlement.first_seen)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                entries.remove(&id);
            }
        }
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "evicted old settlements");
        }
    }

    /// Drop a settlement whose confirmation never reached the backend, so the
    /// next arrival tries again.
    pub async fn forget(&self, payment_id: &PaymentId) {
        self.entries.lock().await.remove(payment_id);
    }

    pub async fn get(&self, payment_id: &PaymentId) -> Option<Settlement> {
        self.entries.lock().await.get(payment_id).cloned()
    }

    /// Number of settled payments.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
