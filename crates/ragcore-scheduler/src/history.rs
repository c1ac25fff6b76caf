//! Bounded in-memory tick history for observability (spec §4.9: "a bounded
//! in-memory history of the last 500 ticks is retained").

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::source::TickCounters;

#[derive(Debug, Clone)]
pub struct TickRecord {
    pub tick_at: DateTime<Utc>,
    pub stale_cleaned: HashMap<String, u64>,
    pub counters: HashMap<String, TickCounters>,
}

pub struct TickHistory {
    capacity: usize,
    records: Mutex<VecDeque<TickRecord>>,
}

impl TickHistory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, records: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn record(&self, record: TickRecord) {
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn snapshot(&self) -> Vec<TickRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
