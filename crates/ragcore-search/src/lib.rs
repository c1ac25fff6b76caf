//! KB Search Service (C11, spec §4.11): a field-based query evaluator over
//! chunks and documents, with an explicit field-type-to-operator dispatch
//! map rather than reflective lookup. No teacher analogue — grounded
//! directly on spec §4.11's field/operator tables.

pub mod error;
pub mod fields;
pub mod records;
pub mod service;
pub mod source;

pub use error::{SearchError, SearchErrorCode};
pub use fields::{FieldType, Operator, CHUNK_FIELDS, DOCUMENT_FIELDS};
pub use records::{ChunkHit, ChunkRecord, DocumentHit, DocumentRecord, SearchPage, SortOrder, PAGE_SIZE};
pub use service::SearchService;
pub use source::{ChunkSource, DocumentSource, KnowledgeBaseNameResolver};

pub use error::Result;
