//! Routes a dequeued job to its stage handler (spec §4.6 step 4). Declared
//! as a narrow, dyn-safe trait so the dispatch table can hold a mix of
//! ingestion/profiling/plugin-host handlers behind one seam, following the
//! local-trait pattern established in `ragcore-ingestion::stages`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ragcore_core::models::Job;

use crate::Result;

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<()>;
}

/// `WorkloadType::queue_name()` -> handler. Built once at startup and
/// shared by every worker loop in the process.
#[derive(Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, queue_name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(queue_name.into(), handler);
    }

    pub fn get(&self, queue_name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(queue_name).cloned()
    }
}
