//! Database metadata: relations, fields and foreign keys of a schema.
//!
//! The compiler only ever reads this through the [`Catalog`] trait.
//! [`DatabaseMetadata`] is the stock implementation, deserializable from a
//! metadata JSON document or buildable from DDL via [`crate::ddl`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// JDBC type codes, as reported by database introspection.
pub mod jdbc_types {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const BOOLEAN: i32 = 16;
    pub const OTHER: i32 = 1111;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseSensitivity {
    #[default]
    InsensitiveStoredLower,
    InsensitiveStoredUpper,
    InsensitiveStoredMixed,
    Sensitive,
}

impl CaseSensitivity {
    /// Normalize a database object name the way the database stores it.
    /// Quoted names are taken literally.
    pub fn normalize(self, id: &str) -> String {
        if is_double_quoted(id) {
            return id.to_string();
        }
        match self {
            Self::InsensitiveStoredLower => id.to_lowercase(),
            Self::InsensitiveStoredUpper => id.to_uppercase(),
            Self::InsensitiveStoredMixed | Self::Sensitive => id.to_string(),
        }
    }

    /// Quote an identifier only if quoting would change how the database reads it.
    pub fn quote_if_needed(self, id: &str) -> String {
        if is_double_quoted(id) {
            return id.to_string();
        }
        let bare = !id.is_empty()
            && !id.starts_with('_')
            && match self {
                Self::InsensitiveStoredLower => {
                    id.chars().all(|c| c.is_ascii_lowercase() || c == '_')
                }
                Self::InsensitiveStoredUpper => {
                    id.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                }
                Self::InsensitiveStoredMixed | Self::Sensitive => false,
            };
        if bare {
            id.to_string()
        } else {
            format!("\"{}\"", id)
        }
    }
}

fn is_double_quoted(id: &str) -> bool {
    id.len() >= 2 && id.starts_with('"') && id.ends_with('"')
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
}

impl RelId {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn id_string(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub jdbc_type_code: i32,
    pub database_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fractional_digits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_part_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Field {
    /// Unknown nullability counts as nullable.
    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelType {
    #[default]
    Table,
    View,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelMetadata {
    pub relation_id: RelId,
    #[serde(default)]
    pub relation_type: RelType,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RelMetadata {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key fields in key part order.
    pub fn primary_key_fields(&self) -> Vec<&Field> {
        let mut pks: Vec<&Field> = self
            .fields
            .iter()
            .filter(|f| f.primary_key_part_number.is_some())
            .collect();
        pks.sort_by_key(|f| f.primary_key_part_number);
        pks
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FkComponent {
    pub foreign_key_field_name: String,
    pub primary_key_field_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
    /// The referencing (child) relation.
    pub foreign_key_relation_id: RelId,
    /// The referenced (parent) relation.
    pub primary_key_relation_id: RelId,
    pub foreign_key_components: Vec<FkComponent>,
}

impl ForeignKey {
    pub fn child_field_names(&self) -> Vec<&str> {
        self.foreign_key_components
            .iter()
            .map(|c| c.foreign_key_field_name.as_str())
            .collect()
    }

    pub fn parent_field_names(&self) -> Vec<&str> {
        self.foreign_key_components
            .iter()
            .map(|c| c.primary_key_field_name.as_str())
            .collect()
    }

    /// True if the fk-side field names are exactly the given (normalized) names.
    pub fn child_field_set_equals(&self, names: &[String]) -> bool {
        let mut mine = self.child_field_names();
        let mut theirs: Vec<&str> = names.iter().map(String::as_str).collect();
        mine.sort_unstable();
        theirs.sort_unstable();
        theirs.dedup();
        mine == theirs
    }
}

/// Read-only view of a schema, as needed by the compiler.
pub trait Catalog: Send + Sync {
    fn relation(&self, rel_id: &RelId) -> Option<&RelMetadata>;

    /// All foreign keys from `child` to `parent`, in a stable order.
    fn foreign_keys_from_to(&self, child: &RelId, parent: &RelId) -> Vec<&ForeignKey>;

    /// The DBMS product name, e.g. "PostgreSQL".
    fn product_name(&self) -> &str;

    fn case_sensitivity(&self) -> CaseSensitivity;

    fn default_schema(&self) -> Option<&str> {
        None
    }

    fn normalize_name(&self, id: &str) -> String {
        self.case_sensitivity().normalize(id)
    }

    fn quote_if_needed(&self, id: &str) -> String {
        self.case_sensitivity().quote_if_needed(id)
    }

    /// Make a relation id from a possibly schema-qualified table name. The
    /// relation is not checked for existence.
    fn to_rel_id(&self, table: &str, default_schema: Option<&str>) -> RelId {
        match table.split_once('.') {
            Some((schema, name)) => RelId {
                schema: Some(self.normalize_name(schema)),
                name: self.normalize_name(name),
            },
            None => RelId {
                schema: default_schema
                    .or(self.default_schema())
                    .map(|s| self.normalize_name(s)),
                name: self.normalize_name(table),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseMetadataDoc {
    #[serde(default)]
    schema_name: Option<String>,
    #[serde(default)]
    relation_metadatas: Vec<RelMetadata>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    case_sensitivity: CaseSensitivity,
    dbms_name: String,
    #[serde(default)]
    dbms_version: String,
}

impl From<DatabaseMetadataDoc> for DatabaseMetadata {
    fn from(doc: DatabaseMetadataDoc) -> Self {
        let mut dbmd = DatabaseMetadata::new(
            doc.schema_name,
            doc.relation_metadatas,
            doc.foreign_keys,
            doc.case_sensitivity,
            doc.dbms_name,
        );
        dbmd.dbms_version = doc.dbms_version;
        dbmd
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "DatabaseMetadataDoc")]
pub struct DatabaseMetadata {
    pub schema_name: Option<String>,
    relation_metadatas: Vec<RelMetadata>,
    foreign_keys: Vec<ForeignKey>,
    pub case_sensitivity: CaseSensitivity,
    pub dbms_name: String,
    pub dbms_version: String,
    #[serde(skip)]
    rels_by_id: HashMap<RelId, usize>,
    #[serde(skip)]
    fks_by_child: HashMap<RelId, Vec<usize>>,
}

impl DatabaseMetadata {
    pub fn new(
        schema_name: Option<String>,
        mut relation_metadatas: Vec<RelMetadata>,
        mut foreign_keys: Vec<ForeignKey>,
        case_sensitivity: CaseSensitivity,
        dbms_name: impl Into<String>,
    ) -> Self {
        // Sorted for deterministic output.
        relation_metadatas.sort_by_key(|rmd| rmd.relation_id.id_string());
        foreign_keys.sort_by(|a, b| {
            a.foreign_key_relation_id
                .id_string()
                .cmp(&b.foreign_key_relation_id.id_string())
                .then_with(|| {
                    a.primary_key_relation_id
                        .id_string()
                        .cmp(&b.primary_key_relation_id.id_string())
                })
                .then_with(|| a.child_field_names().cmp(&b.child_field_names()))
                .then_with(|| a.parent_field_names().cmp(&b.parent_field_names()))
        });

        let rels_by_id = relation_metadatas
            .iter()
            .enumerate()
            .map(|(i, rmd)| (rmd.relation_id.clone(), i))
            .collect();

        let mut fks_by_child: HashMap<RelId, Vec<usize>> = HashMap::new();
        for (i, fk) in foreign_keys.iter().enumerate() {
            fks_by_child
                .entry(fk.foreign_key_relation_id.clone())
                .or_default()
                .push(i);
        }

        Self {
            schema_name,
            relation_metadatas,
            foreign_keys,
            case_sensitivity,
            dbms_name: dbms_name.into(),
            dbms_version: String::new(),
            rels_by_id,
            fks_by_child,
        }
    }

    pub fn relation_metadatas(&self) -> &[RelMetadata] {
        &self.relation_metadatas
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }
}

impl Catalog for DatabaseMetadata {
    fn relation(&self, rel_id: &RelId) -> Option<&RelMetadata> {
        self.rels_by_id
            .get(rel_id)
            .map(|&i| &self.relation_metadatas[i])
    }

    fn foreign_keys_from_to(&self, child: &RelId, parent: &RelId) -> Vec<&ForeignKey> {
        // Only keys between registered relations are considered.
        if self.relation(child).is_none() || self.relation(parent).is_none() {
            return Vec::new();
        }
        let Some(indexes) = self.fks_by_child.get(child) else {
            return Vec::new();
        };
        indexes
            .iter()
            .map(|&i| &self.foreign_keys[i])
            .filter(|fk| &fk.primary_key_relation_id == parent)
            .collect()
    }

    fn product_name(&self) -> &str {
        &self.dbms_name
    }

    fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    fn default_schema(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, pk: Option<u32>) -> Field {
        Field {
            name: name.to_string(),
            jdbc_type_code: jdbc_types::INTEGER,
            database_type: "int4".to_string(),
            length: None,
            precision: Some(32),
            fractional_digits: Some(0),
            nullable: Some(pk.is_none()),
            primary_key_part_number: pk,
            comment: None,
        }
    }

    fn sample() -> DatabaseMetadata {
        let rel = |name: &str, fields: Vec<Field>| RelMetadata {
            relation_id: RelId::new(None, name),
            relation_type: RelType::Table,
            fields,
            comment: None,
        };
        let fk = |child: &str, parent: &str, col: &str| ForeignKey {
            constraint_name: None,
            foreign_key_relation_id: RelId::new(None, child),
            primary_key_relation_id: RelId::new(None, parent),
            foreign_key_components: vec![FkComponent {
                foreign_key_field_name: col.to_string(),
                primary_key_field_name: "id".to_string(),
            }],
        };
        DatabaseMetadata::new(
            None,
            vec![
                rel("person", vec![field("id", Some(1))]),
                rel(
                    "message",
                    vec![field("id", Some(1)), field("sender_id", None), field("recipient_id", None)],
                ),
            ],
            vec![
                fk("message", "person", "sender_id"),
                fk("message", "person", "recipient_id"),
                fk("message", "ghost", "ghost_id"),
            ],
            CaseSensitivity::InsensitiveStoredLower,
            "PostgreSQL",
        )
    }

    #[test]
    fn test_normalize_name() {
        let cs = CaseSensitivity::InsensitiveStoredLower;
        assert_eq!(cs.normalize("Drug"), "drug");
        assert_eq!(cs.normalize("\"Drug\""), "\"Drug\"");
        assert_eq!(CaseSensitivity::InsensitiveStoredUpper.normalize("drug"), "DRUG");
    }

    #[test]
    fn test_quote_if_needed() {
        let lower = CaseSensitivity::InsensitiveStoredLower;
        assert_eq!(lower.quote_if_needed("drug_id"), "drug_id");
        assert_eq!(lower.quote_if_needed("drugId"), "\"drugId\"");
        assert_eq!(lower.quote_if_needed("_id"), "\"_id\"");
        assert_eq!(lower.quote_if_needed("\"x\""), "\"x\"");
        let upper = CaseSensitivity::InsensitiveStoredUpper;
        assert_eq!(upper.quote_if_needed("DRUG_ID"), "DRUG_ID");
        assert_eq!(upper.quote_if_needed("drugId"), "\"drugId\"");
    }

    #[test]
    fn test_primary_key_fields_ordered() {
        let rmd = RelMetadata {
            relation_id: RelId::new(None, "t"),
            relation_type: RelType::Table,
            fields: vec![field("b", Some(2)), field("x", None), field("a", Some(1))],
            comment: None,
        };
        let names: Vec<&str> = rmd.primary_key_fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_foreign_keys_from_to() {
        let dbmd = sample();
        let message = RelId::new(None, "message");
        let person = RelId::new(None, "person");
        assert_eq!(dbmd.foreign_keys_from_to(&message, &person).len(), 2);
        assert!(dbmd.foreign_keys_from_to(&person, &message).is_empty());
        // Keys to unregistered relations are ignored.
        assert!(dbmd
            .foreign_keys_from_to(&message, &RelId::new(None, "ghost"))
            .is_empty());
    }

    #[test]
    fn test_to_rel_id() {
        let dbmd = sample();
        assert_eq!(dbmd.to_rel_id("Person", None), RelId::new(None, "person"));
        assert_eq!(
            dbmd.to_rel_id("Public.Person", None),
            RelId::new(Some("public"), "person")
        );
        assert_eq!(
            dbmd.to_rel_id("person", Some("app")),
            RelId::new(Some("app"), "person")
        );
    }

    #[test]
    fn test_json_round_trip_rebuilds_indexes() {
        let dbmd = sample();
        let json = serde_json::to_string(&dbmd).unwrap();
        let back: DatabaseMetadata = serde_json::from_str(&json).unwrap();
        assert!(back.relation(&RelId::new(None, "person")).is_some());
        assert_eq!(back.product_name(), "PostgreSQL");
        assert_eq!(
            back.foreign_keys_from_to(&RelId::new(None, "message"), &RelId::new(None, "person"))
                .len(),
            2
        );
    }

    #[test]
    fn test_child_field_set_equals() {
        let dbmd = sample();
        let fk = &dbmd.foreign_keys()[0];
        assert!(fk.child_field_set_equals(&[fk.child_field_names()[0].to_string()]));
        assert!(!fk.child_field_set_equals(&["nope".to_string()]));
    }
}
