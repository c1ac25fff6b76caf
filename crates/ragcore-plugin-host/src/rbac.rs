//! RBAC re-verification seam: spec §4.10 requires every `kb.search_*` /
//! `kb.get_document` call to re-check the bound user's *current*
//! permissions against every bound KB, not just trust the context built at
//! dispatch time. Kept local and dyn-safe per this workspace's established
//! pattern for crate-seam traits — rule evaluation itself is out of scope
//! (spec §1).

use async_trait::async_trait;
use ragcore_core::ids::{KnowledgeBaseId, UserId};

#[async_trait]
pub trait RbacChecker: Send + Sync {
    async fn can_access(&self, user_id: &UserId, knowledge_base_id: &KnowledgeBaseId) -> bool;
}
