//! The field-based query evaluator itself (spec §4.11): validates field and
//! operator against the explicit dispatch map, evaluates the predicate in
//! process, then sorts and paginates.

use std::collections::HashMap;
use std::sync::Arc;

use ragcore_core::ids::{DocumentId, KnowledgeBaseId};
use serde_json::Value;

use crate::error::{Result, SearchError};
use crate::fields::{find_field, operators_for, FieldType, Operator, CHUNK_FIELDS, DOCUMENT_FIELDS};
use crate::records::{ChunkHit, ChunkRecord, DocumentHit, DocumentRecord, SearchPage, SortOrder, PAGE_SIZE};
use crate::source::{ChunkSource, DocumentSource, KnowledgeBaseNameResolver};

/// A field's raw content on one record, abstracted over its JSON shape so
/// the same predicate/sort code serves every field type.
enum FieldValue<'a> {
    Text(&'a str),
    Array(&'a [String]),
    Object(&'a Value),
}

fn matches(op: Operator, field_value: &FieldValue, query_value: &Value) -> Result<bool> {
    match field_value {
        FieldValue::Text(text) => {
            let needle = query_value
                .as_str()
                .ok_or_else(|| SearchError::invalid_value("expected a string value for a text field"))?;
            Ok(match op {
                Operator::Eq => *text == needle,
                Operator::Contains => text.contains(needle),
                Operator::Icontains => text.to_lowercase().contains(&needle.to_lowercase()),
                _ => unreachable!("operator already validated against the field's allowed set"),
            })
        }
        FieldValue::Array(items) => match op {
            Operator::Contains | Operator::HasKey => {
                let needle = query_value
                    .as_str()
                    .ok_or_else(|| SearchError::invalid_value("expected a string value for an array field"))?;
                Ok(items.iter().any(|i| i == needle))
            }
            Operator::HasAny => {
                let needles: Vec<&str> = query_value
                    .as_array()
                    .ok_or_else(|| SearchError::invalid_value("expected an array value for has_any"))?
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                Ok(items.iter().any(|i| needles.contains(&i.as_str())))
            }
            _ => unreachable!("operator already validated against the field's allowed set"),
        },
        FieldValue::Object(object) => {
            let obj = object
                .as_object()
                .ok_or_else(|| SearchError::invalid_value("field is not a JSON object"))?;
            match op {
                Operator::Contains => {
                    let sub = query_value
                        .as_object()
                        .ok_or_else(|| SearchError::invalid_value("expected an object value for contains"))?;
                    Ok(sub.iter().all(|(k, v)| obj.get(k) == Some(v)))
                }
                Operator::HasKey => {
                    let key = query_value
                        .as_str()
                        .ok_or_else(|| SearchError::invalid_value("expected a string key for has_key"))?;
                    Ok(obj.contains_key(key))
                }
                Operator::PathContains => {
                    let path = query_value
                        .get("path")
                        .and_then(Value::as_str)
                        .ok_or_else(|| SearchError::invalid_value("path_contains requires {path, value}"))?;
                    let expected = query_value
                        .get("value")
                        .ok_or_else(|| SearchError::invalid_value("path_contains requires {path, value}"))?;
                    let mut cursor = object;
                    for part in path.split('.') {
                        cursor = cursor.get(part).unwrap_or(&Value::Null);
                    }
                    Ok(cursor == expected)
                }
                _ => unreachable!("operator already validated against the field's allowed set"),
            }
        }
    }
}

fn sort_key(field_value: &FieldValue) -> String {
    match field_value {
        FieldValue::Text(text) => text.to_string(),
        FieldValue::Array(items) => items.join(","),
        FieldValue::Object(object) => object.to_string(),
    }
}

fn validate(table: &'static [crate::fields::FieldSpec], field: &str, operator: &str) -> Result<(FieldType, Operator)> {
    let spec = find_field(table, field).ok_or_else(|| SearchError::invalid_field(field))?;
    let op = Operator::parse(operator).ok_or_else(|| SearchError::invalid_operator(operator, field))?;
    if !operators_for(spec.field_type).contains(&op) {
        return Err(SearchError::invalid_operator(operator, field));
    }
    Ok((spec.field_type, op))
}

fn chunk_field_value<'a>(record: &'a ChunkRecord, field: &str) -> FieldValue<'a> {
    match field {
        "content" => FieldValue::Text(&record.content),
        "summary" => FieldValue::Text(record.summary.as_deref().unwrap_or("")),
        "keywords" => FieldValue::Array(&record.keywords),
        "topics" => FieldValue::Array(&record.topics),
        _ => unreachable!("field already validated against CHUNK_FIELDS"),
    }
}

fn document_field_value<'a>(record: &'a DocumentRecord, field: &str) -> FieldValue<'a> {
    match field {
        "title" => FieldValue::Text(&record.title),
        "content" => FieldValue::Text(&record.content),
        "synopsis" => FieldValue::Text(record.synopsis.as_deref().unwrap_or("")),
        "capability_manifest" => FieldValue::Object(&record.capability_manifest),
        _ => unreachable!("field already validated against DOCUMENT_FIELDS"),
    }
}

fn paginate<T: Clone>(mut items: Vec<(String, T)>, sort_order: SortOrder, page: u32) -> SearchPage<T> {
    items.sort_by(|a, b| match sort_order {
        SortOrder::Asc => a.0.cmp(&b.0),
        SortOrder::Desc => b.0.cmp(&a.0),
    });
    let total = items.len() as u64;
    let page = page.max(1);
    let start = (page as usize - 1) * PAGE_SIZE;
    let page_items = items.into_iter().skip(start).take(PAGE_SIZE).map(|(_, v)| v).collect();
    SearchPage { items: page_items, page, page_size: PAGE_SIZE as u32, total }
}

pub struct SearchService {
    chunks: Arc<dyn ChunkSource>,
    documents: Arc<dyn DocumentSource>,
    kb_names: Arc<dyn KnowledgeBaseNameResolver>,
}

impl SearchService {
    pub fn new(
        chunks: Arc<dyn ChunkSource>,
        documents: Arc<dyn DocumentSource>,
        kb_names: Arc<dyn KnowledgeBaseNameResolver>,
    ) -> Self {
        Self { chunks, documents, kb_names }
    }

    async fn resolve_names(&self, ids: impl Iterator<Item = &KnowledgeBaseId>) -> Result<HashMap<KnowledgeBaseId, String>> {
        let mut names = HashMap::new();
        for id in ids {
            if names.contains_key(id) {
                continue;
            }
            let name = self.kb_names.name_of(id).await?.unwrap_or_else(|| "unknown".to_string());
            names.insert(id.clone(), name);
        }
        Ok(names)
    }

    pub async fn search_chunks(
        &self,
        bound_knowledge_base_ids: &[KnowledgeBaseId],
        field: &str,
        operator: &str,
        value: &Value,
        page: u32,
        sort_order: SortOrder,
    ) -> Result<SearchPage<ChunkHit>> {
        validate(CHUNK_FIELDS, field, operator)?;
        let op = Operator::parse(operator).expect("validated above");

        let records = self.chunks.chunks_in(bound_knowledge_base_ids).await?;
        let bound: std::collections::HashSet<&KnowledgeBaseId> = bound_knowledge_base_ids.iter().collect();
        let mut matched = Vec::new();
        for record in &records {
            if !bound.contains(&record.knowledge_base_id) {
                continue;
            }
            let fv = chunk_field_value(record, field);
            if matches(op, &fv, value)? {
                matched.push((sort_key(&fv), record));
            }
        }

        let names = self.resolve_names(matched.iter().map(|(_, r)| &r.knowledge_base_id)).await?;
        let hits: Vec<(String, ChunkHit)> = matched
            .into_iter()
            .map(|(key, r)| {
                let kb_name = names.get(&r.knowledge_base_id).cloned().unwrap_or_else(|| "unknown".to_string());
                (
                    key,
                    ChunkHit {
                        chunk_id: r.id.clone(),
                        document_id: r.document_id.clone(),
                        knowledge_base_id: r.knowledge_base_id.clone(),
                        knowledge_base_name: kb_name,
                    },
                )
            })
            .collect();

        Ok(paginate(hits, sort_order, page))
    }

    pub async fn search_documents(
        &self,
        bound_knowledge_base_ids: &[KnowledgeBaseId],
        field: &str,
        operator: &str,
        value: &Value,
        page: u32,
        sort_order: SortOrder,
    ) -> Result<SearchPage<DocumentHit>> {
        validate(DOCUMENT_FIELDS, field, operator)?;
        let op = Operator::parse(operator).expect("validated above");

        let records = self.documents.documents_in(bound_knowledge_base_ids).await?;
        let bound: std::collections::HashSet<&KnowledgeBaseId> = bound_knowledge_base_ids.iter().collect();
        let mut matched = Vec::new();
        for record in &records {
            if !bound.contains(&record.knowledge_base_id) {
                continue;
            }
            let fv = document_field_value(record, field);
            if matches(op, &fv, value)? {
                matched.push((sort_key(&fv), record));
            }
        }

        let names = self.resolve_names(matched.iter().map(|(_, r)| &r.knowledge_base_id)).await?;
        let hits: Vec<(String, DocumentHit)> = matched
            .into_iter()
            .map(|(key, r)| {
                let kb_name = names.get(&r.knowledge_base_id).cloned().unwrap_or_else(|| "unknown".to_string());
                (
                    key,
                    DocumentHit {
                        document_id: r.id.clone(),
                        knowledge_base_id: r.knowledge_base_id.clone(),
                        knowledge_base_name: kb_name,
                    },
                )
            })
            .collect();

        Ok(paginate(hits, sort_order, page))
    }

    pub async fn get_document(
        &self,
        bound_knowledge_base_ids: &[KnowledgeBaseId],
        document_id: &DocumentId,
    ) -> Result<DocumentHit> {
        let record = self
            .documents
            .document_by_id(document_id)
            .await?
            .ok_or_else(|| SearchError::not_found("document"))?;

        if !bound_knowledge_base_ids.contains(&record.knowledge_base_id) {
            return Err(SearchError::not_found("document"));
        }

        let name = self
            .kb_names
            .name_of(&record.knowledge_base_id)
            .await?
            .unwrap_or_else(|| "unknown".to_string());

        Ok(DocumentHit {
            document_id: record.id,
            knowledge_base_id: record.knowledge_base_id,
            knowledge_base_name: name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragcore_core::ids::DocumentChunkId;

    struct FakeChunks {
        records: Vec<ChunkRecord>,
    }

    #[async_trait]
    impl ChunkSource for FakeChunks {
        async fn chunks_in(&self, _ids: &[KnowledgeBaseId]) -> Result<Vec<ChunkRecord>> {
            Ok(self.records.clone())
        }
    }

    struct FakeDocuments {
        records: Vec<DocumentRecord>,
    }

    #[async_trait]
    impl DocumentSource for FakeDocuments {
        async fn documents_in(&self, _ids: &[KnowledgeBaseId]) -> Result<Vec<DocumentRecord>> {
            Ok(self.records.clone())
        }

        async fn document_by_id(&self, document_id: &DocumentId) -> Result<Option<DocumentRecord>> {
            Ok(self.records.iter().find(|r| &r.id == document_id).cloned())
        }
    }

    struct FakeKbNames;

    #[async_trait]
    impl KnowledgeBaseNameResolver for FakeKbNames {
        async fn name_of(&self, _id: &KnowledgeBaseId) -> Result<Option<String>> {
            Ok(Some("demo-kb".to_string()))
        }
    }

    fn kb() -> KnowledgeBaseId {
        KnowledgeBaseId::generate()
    }

    #[tokio::test]
    async fn icontains_matches_case_insensitively() {
        let kb_id = kb();
        let records = vec![ChunkRecord {
            id: DocumentChunkId::generate(),
            document_id: DocumentId::generate(),
            knowledge_base_id: kb_id.clone(),
            content: "The Quick Brown Fox".to_string(),
            summary: None,
            keywords: vec![],
            topics: vec![],
        }];
        let service = SearchService::new(
            Arc::new(FakeChunks { records }),
            Arc::new(FakeDocuments { records: vec![] }),
            Arc::new(FakeKbNames),
        );
        let page = service
            .search_chunks(&[kb_id], "content", "icontains", &serde_json::json!("quick brown"), 1, SortOrder::Asc)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn unknown_field_is_rejected() {
        let kb_id = kb();
        let service = SearchService::new(
            Arc::new(FakeChunks { records: vec![] }),
            Arc::new(FakeDocuments { records: vec![] }),
            Arc::new(FakeKbNames),
        );
        let err = service
            .search_chunks(&[kb_id], "nonexistent", "eq", &serde_json::json!("x"), 1, SortOrder::Asc)
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::SearchErrorCode::InvalidField);
    }

    #[tokio::test]
    async fn array_operator_rejected_on_text_field() {
        let kb_id = kb();
        let service = SearchService::new(
            Arc::new(FakeChunks { records: vec![] }),
            Arc::new(FakeDocuments { records: vec![] }),
            Arc::new(FakeKbNames),
        );
        let err = service
            .search_chunks(&[kb_id], "content", "has_any", &serde_json::json!(["x"]), 1, SortOrder::Asc)
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::SearchErrorCode::InvalidOperator);
    }

    #[tokio::test]
    async fn document_outside_bound_set_is_not_found() {
        let bound_kb = kb();
        let other_kb = kb();
        let doc_id = DocumentId::generate();
        let records = vec![DocumentRecord {
            id: doc_id.clone(),
            knowledge_base_id: other_kb,
            title: "t".to_string(),
            content: "c".to_string(),
            synopsis: None,
            capability_manifest: serde_json::json!({}),
        }];
        let service = SearchService::new(
            Arc::new(FakeChunks { records: vec![] }),
            Arc::new(FakeDocuments { records }),
            Arc::new(FakeKbNames),
        );
        let err = service.get_document(&[bound_kb], &doc_id).await.unwrap_err();
        assert_eq!(err.code, crate::error::SearchErrorCode::NotFound);
    }
}
