//! `KnowledgeObject -> Document` mapping (spec §4.10, supplemented feature
//! 4: elevated to its own module per `backend/src/shu/services/knowledge_object_service.py`
//! rather than inlined into the capability dispatcher).

use ragcore_core::hash::deterministic_id;
use serde_json::Value;

/// A plugin-supplied object to upsert into a knowledge base. `object_type`
/// stands in for the original's `type` field, a reserved word in Rust.
#[derive(Debug, Clone)]
pub struct KnowledgeObject {
    pub id: Option<String>,
    pub object_type: String,
    pub source: String,
    pub external_id: String,
    pub title: Option<String>,
    pub content: String,
    pub attributes: Option<Value>,
    pub permissions: Option<Value>,
    pub lineage: Option<Value>,
}

/// File-type inference table, keyed on `KnowledgeObject::object_type`.
/// Unknown types fall back to `"document"` rather than rejecting the
/// upsert — the KO surface intentionally doesn't enumerate every possible
/// plugin-defined object kind.
fn file_type_for(object_type: &str) -> &'static str {
    match object_type {
        "note" => "note",
        "task" => "task",
        "contact" => "contact",
        "event" => "event",
        "message" => "message",
        "record" => "record",
        _ => "document",
    }
}

impl KnowledgeObject {
    /// `SHA-256("<plugin>:<account>|<external_id>")` (spec §4.10), computed
    /// when no caller-supplied id is present.
    pub fn resolve_id(&self, plugin_name: &str, account: &str) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => {
                let namespace = format!("{plugin_name}:{account}");
                deterministic_id(&namespace, &self.external_id)
            }
        }
    }

    pub fn file_type(&self) -> &'static str {
        file_type_for(&self.object_type)
    }
}
