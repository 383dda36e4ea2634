//! Data sources polled by the periodic topic handlers.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::errors::SourceError;
use crate::types::{DashboardStats, SlaUpdate};

/// Supplies aggregate ticket counters for `dashboard-stats`.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Current counters.
    async fn dashboard_stats(&self) -> Result<DashboardStats, SourceError>;
}

/// Supplies SLA measurements for `sla-monitoring`.
///
/// Records are addressed by a monotonically increasing position. Each
/// subscriber keeps its own cursor, so a poll never consumes records another
/// subscriber has yet to see.
#[async_trait]
pub trait SlaSource: Send + Sync {
    /// Position the next record will get. A cursor taken here sees only
    /// records added afterwards.
    fn head(&self) -> u64;

    /// Records at or after `cursor`, oldest first.
    async fn poll(&self, cursor: u64) -> Result<SlaBatch, SourceError>;
}

/// Result of one [`SlaSource::poll`].
#[derive(Clone, Debug, Default)]
pub struct SlaBatch {
    /// Records at or after the requested cursor that are still retained.
    pub records: Vec<SlaUpdate>,
    /// Cursor for the next poll.
    pub next: u64,
}

/// In-memory dashboard snapshot, replaced wholesale by whoever owns the data.
#[derive(Default)]
pub struct SharedStats {
    current: RwLock<DashboardStats>,
}

impl SharedStats {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot. `last_update` is set to now.
    pub fn set(&self, mut stats: DashboardStats) {
        stats.last_update = Utc::now();
        *self.current.write() = stats;
    }

    /// Copy of the current snapshot.
    pub fn get(&self) -> DashboardStats {
        self.current.read().clone()
    }
}

#[async_trait]
impl StatsSource for SharedStats {
    async fn dashboard_stats(&self) -> Result<DashboardStats, SourceError> {
        Ok(self.get())
    }
}

/// In-memory SLA feed: a bounded log of the most recent records.
///
/// Polling does not remove anything; records leave only when newer ones push
/// them past the retention limit. A cursor that fell behind the oldest
/// retained record resumes from the oldest one.
pub struct SlaFeed {
    log: Mutex<SlaLog>,
    limit: usize,
}

#[derive(Default)]
struct SlaLog {
    next: u64,
    records: VecDeque<(u64, SlaUpdate)>,
}

impl SlaFeed {
    /// Default number of retained records.
    pub const DEFAULT_LIMIT: usize = 1024;

    /// Create a feed retaining at most `limit` records (oldest dropped first).
    pub fn new(limit: usize) -> Self {
        Self {
            log: Mutex::new(SlaLog::default()),
            limit: limit.max(1),
        }
    }

    /// Append records.
    pub fn push(&self, records: impl IntoIterator<Item = SlaUpdate>) {
        let mut log = self.log.lock();
        for record in records {
            if log.records.len() == self.limit {
                let _ = log.records.pop_front();
            }
            let position = log.next;
            log.records.push_back((position, record));
            log.next += 1;
        }
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.log.lock().records.len()
    }

    /// Whether nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SlaFeed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

#[async_trait]
impl SlaSource for SlaFeed {
    fn head(&self) -> u64 {
        self.log.lock().next
    }

    async fn poll(&self, cursor: u64) -> Result<SlaBatch, SourceError> {
        let log = self.log.lock();
        let records = log
            .records
            .iter()
            .filter(|(position, _)| *position >= cursor)
            .map(|(_, record)| record.clone())
            .collect();
        Ok(SlaBatch {
            records,
            next: log.next,
        })
    }
}
