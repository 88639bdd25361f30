//! Output specification: the declarative description of a query's JSON shape.

use serde::{Deserialize, Serialize};

/// Placeholder for the table alias inside expressions, filters and orderings.
pub const DEFAULT_TABLE_ALIAS_VAR: &str = "$$";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryGroupSpec {
    #[serde(default)]
    pub default_schema: Option<String>,
    #[serde(default)]
    pub output_field_name_default: OutputFieldNameDefault,
    #[serde(default)]
    pub generate_unqualified_names_for_schemas: Vec<String>,
    pub query_specs: Vec<QuerySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub query_name: String,
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub result_representations: Option<Vec<ResultRepr>>,
    #[serde(default)]
    pub generate_result_types: Option<bool>,
    #[serde(default)]
    pub output_field_name_default: Option<OutputFieldNameDefault>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub for_update: Option<bool>,
}

impl QuerySpec {
    pub fn result_representations(&self) -> Vec<ResultRepr> {
        match &self.result_representations {
            Some(reprs) if !reprs.is_empty() => reprs.clone(),
            _ => vec![ResultRepr::JsonObjectRows],
        }
    }

    pub fn generate_result_types(&self) -> bool {
        self.generate_result_types.unwrap_or(true)
    }

    pub fn for_update(&self) -> bool {
        self.for_update.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultRepr {
    /// One JSON object per result row.
    JsonObjectRows,
    /// A single row holding a JSON array of all row objects.
    JsonArrayRow,
    /// Plain multi-column rows, nested parts still as JSON.
    MultiColumnRows,
}

impl ResultRepr {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonObjectRows => "JSON_OBJECT_ROWS",
            Self::JsonArrayRow => "JSON_ARRAY_ROW",
            Self::MultiColumnRows => "MULTI_COLUMN_ROWS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputFieldNameDefault {
    AsInDb,
    #[default]
    Camelcase,
}

impl OutputFieldNameDefault {
    /// Output property name for a database field name.
    pub fn apply(self, field_name: &str) -> String {
        match self {
            Self::AsInDb => field_name.to_string(),
            Self::Camelcase => crate::naming::lower_camel_case(field_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableJsonSpec {
    /// Table name, possibly schema-qualified.
    pub table: String,
    #[serde(default)]
    pub field_expressions: Vec<TableFieldExpr>,
    #[serde(default)]
    pub inline_parent_tables: Vec<InlineParentSpec>,
    #[serde(default)]
    pub referenced_parent_tables: Vec<ReferencedParentSpec>,
    #[serde(default)]
    pub child_table_collections: Vec<ChildCollectionSpec>,
    #[serde(default)]
    pub record_condition: Option<RecordCondition>,
}

impl TableJsonSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Related tables in output order: inline parents, referenced parents,
    /// then child collections.
    pub fn related_tables(&self) -> impl Iterator<Item = RelatedSpec<'_>> {
        self.inline_parent_tables
            .iter()
            .map(RelatedSpec::InlineParent)
            .chain(self.referenced_parent_tables.iter().map(RelatedSpec::ReferencedParent))
            .chain(self.child_table_collections.iter().map(RelatedSpec::ChildCollection))
    }

    /// Number of output properties, counting inline parents' properties.
    pub fn json_properties_count(&self) -> usize {
        self.field_expressions.len()
            + self.referenced_parent_tables.len()
            + self.child_table_collections.len()
            + self
                .inline_parent_tables
                .iter()
                .map(|ip| ip.table_json.json_properties_count())
                .sum::<usize>()
    }

    /// Record parameter names declared by this table and all nested tables.
    pub fn param_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .record_condition
            .iter()
            .flat_map(|rc| rc.param_names.iter().cloned())
            .collect();
        for related in self.related_tables() {
            names.extend(related.table_json().param_names());
        }
        names
    }
}

/// One output field: a table column or a SQL expression over the table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFieldExpr {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub with_table_alias_as: Option<String>,
    #[serde(default)]
    pub json_property: Option<String>,
    #[serde(default)]
    pub generated_field_type: Option<String>,
}

impl TableFieldExpr {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn field_as(name: impl Into<String>, json_property: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            json_property: Some(json_property.into()),
            ..Default::default()
        }
    }

    pub fn expression(expr: impl Into<String>, json_property: impl Into<String>) -> Self {
        Self {
            expression: Some(expr.into()),
            json_property: Some(json_property.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineParentSpec {
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub via_foreign_key_fields: Option<Vec<String>>,
    #[serde(default)]
    pub custom_join_condition: Option<CustomJoinCondition>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencedParentSpec {
    pub reference_name: String,
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub via_foreign_key_fields: Option<Vec<String>>,
    #[serde(default)]
    pub custom_join_condition: Option<CustomJoinCondition>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildCollectionSpec {
    pub collection_name: String,
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub foreign_key_fields: Option<Vec<String>>,
    #[serde(default)]
    pub custom_join_condition: Option<CustomJoinCondition>,
    /// Extra condition on child rows, with `$$` standing for the child alias.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub unwrap: Option<bool>,
    #[serde(default)]
    pub order_by: Option<String>,
}

impl ChildCollectionSpec {
    pub fn unwrap(&self) -> bool {
        self.unwrap.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCondition {
    pub sql: String,
    #[serde(default)]
    pub param_names: Vec<String>,
    #[serde(default)]
    pub with_table_alias_as: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomJoinCondition {
    pub equated_fields: Vec<FieldPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPair {
    pub child_field: String,
    pub parent_primary_key_field: String,
}

/// Closed view over the three kinds of related-table specs.
#[derive(Debug, Clone, Copy)]
pub enum RelatedSpec<'a> {
    InlineParent(&'a InlineParentSpec),
    ReferencedParent(&'a ReferencedParentSpec),
    ChildCollection(&'a ChildCollectionSpec),
}

impl<'a> RelatedSpec<'a> {
    pub fn table_json(&self) -> &'a TableJsonSpec {
        match self {
            Self::InlineParent(s) => &s.table_json,
            Self::ReferencedParent(s) => &s.table_json,
            Self::ChildCollection(s) => &s.table_json,
        }
    }

    /// Field names on the child side of the relationship, if given.
    pub fn foreign_key_fields(&self) -> Option<&'a [String]> {
        match self {
            Self::InlineParent(s) => s.via_foreign_key_fields.as_deref(),
            Self::ReferencedParent(s) => s.via_foreign_key_fields.as_deref(),
            Self::ChildCollection(s) => s.foreign_key_fields.as_deref(),
        }
    }

    pub fn custom_join_condition(&self) -> Option<&'a CustomJoinCondition> {
        match self {
            Self::InlineParent(s) => s.custom_join_condition.as_ref(),
            Self::ReferencedParent(s) => s.custom_join_condition.as_ref(),
            Self::ChildCollection(s) => s.custom_join_condition.as_ref(),
        }
    }

    /// Whether the related parent row may be absent: marked optional or filtered.
    /// Always false for child collections, which are never absent.
    pub fn marked_optional(&self) -> bool {
        match self {
            Self::InlineParent(s) => s.optional || s.table_json.record_condition.is_some(),
            Self::ReferencedParent(s) => s.optional || s.table_json.record_condition.is_some(),
            Self::ChildCollection(_) => false,
        }
    }

    /// Short description used in error locations and SQL comments.
    pub fn describe(&self) -> String {
        match self {
            Self::InlineParent(s) => format!("inline parent '{}'", s.table_json.table),
            Self::ReferencedParent(s) => format!("parent '{}'", s.table_json.table),
            Self::ChildCollection(s) => format!("child collection '{}'", s.collection_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_query_group() {
        let json = r#"{
            "defaultSchema": "drugs",
            "querySpecs": [{
                "queryName": "drugs query",
                "resultRepresentations": ["JSON_OBJECT_ROWS", "MULTI_COLUMN_ROWS"],
                "tableJson": {
                    "table": "drug",
                    "fieldExpressions": [
                        {"field": "id"},
                        {"expression": "$$.cid + 1", "jsonProperty": "cidPlus1"}
                    ],
                    "referencedParentTables": [{
                        "referenceName": "registeredBy",
                        "tableJson": {"table": "analyst", "fieldExpressions": [{"field": "short_name"}]}
                    }],
                    "childTableCollections": [{
                        "collectionName": "references",
                        "tableJson": {"table": "drug_reference"},
                        "filter": "$$.priority > 1"
                    }],
                    "recordCondition": {"sql": "$$.id = :id", "paramNames": ["id"]}
                }
            }]
        }"#;
        let group: QueryGroupSpec = serde_json::from_str(json).unwrap();
        assert_eq!(group.output_field_name_default, OutputFieldNameDefault::Camelcase);
        let query = &group.query_specs[0];
        assert_eq!(
            query.result_representations(),
            vec![ResultRepr::JsonObjectRows, ResultRepr::MultiColumnRows]
        );
        assert!(query.generate_result_types());
        assert_eq!(query.table_json.field_expressions.len(), 2);
        assert_eq!(query.table_json.param_names(), vec!["id".to_string()]);
    }

    #[test]
    fn test_related_tables_order() {
        let mut spec = TableJsonSpec::new("drug");
        spec.child_table_collections.push(ChildCollectionSpec {
            collection_name: "refs".into(),
            table_json: TableJsonSpec::new("drug_reference"),
            foreign_key_fields: None,
            custom_join_condition: None,
            filter: None,
            unwrap: None,
            order_by: None,
        });
        spec.inline_parent_tables.push(InlineParentSpec {
            table_json: TableJsonSpec::new("compound"),
            via_foreign_key_fields: Some(vec!["compound_id".into()]),
            custom_join_condition: None,
            optional: false,
        });
        let kinds: Vec<String> = spec.related_tables().map(|r| r.describe()).collect();
        assert_eq!(kinds, vec!["inline parent 'compound'", "child collection 'refs'"]);
        let first = spec.related_tables().next().unwrap();
        assert_eq!(first.foreign_key_fields(), Some(&["compound_id".to_string()][..]));
        assert!(matches!(first, RelatedSpec::InlineParent(_)));
    }

    #[test]
    fn test_marked_optional() {
        let mut parent = ReferencedParentSpec {
            reference_name: "analyst".into(),
            table_json: TableJsonSpec::new("analyst"),
            via_foreign_key_fields: None,
            custom_join_condition: None,
            optional: false,
        };
        assert!(!RelatedSpec::ReferencedParent(&parent).marked_optional());
        parent.table_json.record_condition = Some(RecordCondition {
            sql: "$$.active".into(),
            param_names: vec![],
            with_table_alias_as: None,
        });
        assert!(RelatedSpec::ReferencedParent(&parent).marked_optional());
    }

    #[test]
    fn test_output_field_name_default() {
        assert_eq!(OutputFieldNameDefault::Camelcase.apply("mesh_id"), "meshId");
        assert_eq!(OutputFieldNameDefault::AsInDb.apply("mesh_id"), "mesh_id");
    }
}
