//! The explicit field-type-to-operator dispatch map (spec §4.11): "no
//! reflective lookup" — every searchable field and every operator it
//! accepts is listed here, once.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    JsonArray,
    JsonObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Contains,
    Icontains,
    HasKey,
    HasAny,
    PathContains,
}

impl Operator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "eq" => Some(Operator::Eq),
            "contains" => Some(Operator::Contains),
            "icontains" => Some(Operator::Icontains),
            "has_key" => Some(Operator::HasKey),
            "has_any" => Some(Operator::HasAny),
            "path_contains" => Some(Operator::PathContains),
            _ => None,
        }
    }
}

pub fn operators_for(field_type: FieldType) -> &'static [Operator] {
    match field_type {
        FieldType::Text => &[Operator::Eq, Operator::Contains, Operator::Icontains],
        FieldType::JsonArray => &[Operator::Contains, Operator::HasKey, Operator::HasAny],
        FieldType::JsonObject => &[Operator::Contains, Operator::HasKey, Operator::PathContains],
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
}

pub const CHUNK_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "content", field_type: FieldType::Text },
    FieldSpec { name: "summary", field_type: FieldType::Text },
    FieldSpec { name: "keywords", field_type: FieldType::JsonArray },
    FieldSpec { name: "topics", field_type: FieldType::JsonArray },
];

pub const DOCUMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "title", field_type: FieldType::Text },
    FieldSpec { name: "content", field_type: FieldType::Text },
    FieldSpec { name: "synopsis", field_type: FieldType::Text },
    FieldSpec { name: "capability_manifest", field_type: FieldType::JsonObject },
];

pub fn find_field(table: &'static [FieldSpec], name: &str) -> Option<FieldSpec> {
    table.iter().copied().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_field_does_not_accept_array_operators() {
        assert!(!operators_for(FieldType::Text).contains(&Operator::HasAny));
    }

    #[test]
    fn chunk_keywords_is_a_json_array_field() {
        let spec = find_field(CHUNK_FIELDS, "keywords").unwrap();
        assert_eq!(spec.field_type, FieldType::JsonArray);
    }

    #[test]
    fn unknown_field_is_not_found() {
        assert!(find_field(DOCUMENT_FIELDS, "nonexistent").is_none());
    }
}
