//! The immutable execution context (spec §4.10): every KB- and
//! secret-related capability routes through this value, and plugins cannot
//! mutate `plugin_name`/`user_id` once it is constructed.

use ragcore_core::ids::{KnowledgeBaseId, PluginFeedId, UserId};

use crate::error::{CapabilityError, Result};

#[derive(Debug, Clone)]
pub struct PluginContext {
    plugin_name: String,
    user_id: UserId,
    schedule_id: Option<PluginFeedId>,
    knowledge_base_ids: Vec<KnowledgeBaseId>,
    ocr_mode: String,
}

impl PluginContext {
    pub fn new(
        plugin_name: impl Into<String>,
        user_id: UserId,
        schedule_id: Option<PluginFeedId>,
        knowledge_base_ids: Vec<KnowledgeBaseId>,
        ocr_mode: impl Into<String>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            user_id,
            schedule_id,
            knowledge_base_ids,
            ocr_mode: ocr_mode.into(),
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn schedule_id(&self) -> Option<&PluginFeedId> {
        self.schedule_id.as_ref()
    }

    pub fn knowledge_base_ids(&self) -> &[KnowledgeBaseId] {
        &self.knowledge_base_ids
    }

    pub fn ocr_mode(&self) -> &str {
        &self.ocr_mode
    }

    pub fn source_type_label(&self) -> String {
        format!("plugin:{}", self.plugin_name)
    }

    /// kb.delete_ko/delete_kos_batch require running inside a feed (spec §4.10).
    pub fn require_feed_scope(&self) -> Result<()> {
        if self.schedule_id.is_none() {
            return Err(CapabilityError::not_permitted(
                "kb.delete_ko is only permitted while running inside a feed",
            ));
        }
        Ok(())
    }

    /// Every bound-KB-scoped call must name a KB actually bound to this context.
    pub fn require_bound(&self, knowledge_base_id: &KnowledgeBaseId) -> Result<()> {
        if !self.knowledge_base_ids.contains(knowledge_base_id) {
            return Err(CapabilityError::not_permitted(format!(
                "knowledge base {knowledge_base_id} is not bound to this execution context"
            )));
        }
        Ok(())
    }
}
