//! Foreign key resolution between related tables, and the join conditions
//! built from the resolved key components.

use crate::ast::RelatedSpec;
use crate::dbmd::{Catalog, Field, FkComponent, ForeignKey, RelId, RelMetadata};
use crate::error::{SpecError, SpecErrorKind, SpecLocation};
use crate::naming::un_double_quote;

/// Look up the relation a spec's `table` names.
pub fn relation_for<'c>(
    catalog: &'c dyn Catalog,
    table: &str,
    default_schema: Option<&str>,
    loc: &SpecLocation,
) -> Result<&'c RelMetadata, SpecError> {
    let rel_id = catalog.to_rel_id(table, default_schema);
    catalog
        .relation(&rel_id)
        .ok_or_else(|| loc.error(SpecErrorKind::UnknownRelation(rel_id.id_string())))
}

/// Look up a field of `rel` by the name used in a spec.
pub fn field_for<'r>(
    catalog: &dyn Catalog,
    rel: &'r RelMetadata,
    name: &str,
    loc: &SpecLocation,
) -> Result<&'r Field, SpecError> {
    let normalized = catalog.normalize_name(name);
    rel.field(un_double_quote(&normalized)).ok_or_else(|| {
        loc.error(SpecErrorKind::UnknownField {
            relation: rel.relation_id.id_string(),
            field: name.to_string(),
        })
    })
}

/// Find the single foreign key from `child` to `parent`.
///
/// With `fk_fields`, the key whose child-side field set equals the
/// (normalized) given set is chosen. Without, exactly one key must exist.
pub fn resolve_foreign_key<'c>(
    catalog: &'c dyn Catalog,
    child: &RelId,
    parent: &RelId,
    fk_fields: Option<&[String]>,
) -> Result<&'c ForeignKey, SpecErrorKind> {
    let candidates = catalog.foreign_keys_from_to(child, parent);

    match fk_fields {
        Some(fields) => {
            let normalized: Vec<String> =
                fields.iter().map(|f| catalog.normalize_name(f)).collect();
            candidates
                .into_iter()
                .find(|fk| fk.child_field_set_equals(&normalized))
                .ok_or_else(|| SpecErrorKind::AmbiguousOrMissingForeignKey {
                    child: child.id_string(),
                    parent: parent.id_string(),
                    fields: normalized,
                })
        }
        None => match candidates.as_slice() {
            [] => Err(SpecErrorKind::ForeignKeyNotFound {
                child: child.id_string(),
                parent: parent.id_string(),
            }),
            [fk] => Ok(*fk),
            many => Err(SpecErrorKind::AmbiguousForeignKey {
                child: child.id_string(),
                parent: parent.id_string(),
                candidates: many
                    .iter()
                    .map(|fk| {
                        fk.child_field_names()
                            .into_iter()
                            .map(str::to_string)
                            .collect()
                    })
                    .collect(),
            }),
        },
    }
}

/// Join components linking `child` rows to `parent` rows for a related spec:
/// from its custom join condition if present, otherwise from the resolved
/// foreign key.
pub fn join_components(
    catalog: &dyn Catalog,
    related: RelatedSpec<'_>,
    child: &RelMetadata,
    parent: &RelMetadata,
    loc: &SpecLocation,
) -> Result<Vec<FkComponent>, SpecError> {
    let Some(custom) = related.custom_join_condition() else {
        let fk = resolve_foreign_key(
            catalog,
            &child.relation_id,
            &parent.relation_id,
            related.foreign_key_fields(),
        )
        .map_err(|kind| loc.error(kind))?;
        tracing::debug!(
            child = %child.relation_id,
            parent = %parent.relation_id,
            fields = ?fk.child_field_names(),
            "resolved foreign key"
        );
        return Ok(fk.foreign_key_components.clone());
    };

    if related.foreign_key_fields().is_some() {
        return Err(loc.invalid(
            "foreign key fields and a custom join condition cannot both be specified",
        ));
    }
    if custom.equated_fields.is_empty() {
        return Err(loc.invalid("custom join condition has no equated fields"));
    }

    custom
        .equated_fields
        .iter()
        .map(|pair| {
            let fk_field = catalog.normalize_name(&pair.child_field);
            let pk_field = catalog.normalize_name(&pair.parent_primary_key_field);
            field_for(catalog, child, &fk_field, loc)?;
            field_for(catalog, parent, &pk_field, loc)?;
            Ok(FkComponent {
                foreign_key_field_name: fk_field,
                primary_key_field_name: pk_field,
            })
        })
        .collect()
}

/// True unless some child-side join field is known to be NOT NULL.
pub fn join_fields_nullable(child: &RelMetadata, components: &[FkComponent]) -> bool {
    !components.iter().any(|c| {
        child
            .field(&c.foreign_key_field_name)
            .is_some_and(|f| f.nullable == Some(false))
    })
}

/// Condition restricting one table's rows to those related to a row of a
/// table whose alias is already in scope.
#[derive(Debug, Clone)]
pub enum ParentChildCondition {
    /// The restricted table is the parent; `child_alias` is in scope.
    ParentPk {
        child_alias: String,
        components: Vec<FkComponent>,
    },
    /// The restricted table is the child; `parent_alias` is in scope.
    ChildFk {
        parent_alias: String,
        components: Vec<FkComponent>,
    },
}

impl ParentChildCondition {
    /// The alias of the correlated table, which must stay out of the
    /// restricted table's alias scope.
    pub fn other_alias(&self) -> &str {
        match self {
            Self::ParentPk { child_alias, .. } => child_alias,
            Self::ChildFk { parent_alias, .. } => parent_alias,
        }
    }

    /// Equation form of the condition with `alias` for the restricted table.
    /// `pk_prefix` prefixes parent key field names, for joining on hidden
    /// primary key columns.
    pub fn as_equation_on(&self, alias: &str, catalog: &dyn Catalog, pk_prefix: &str) -> String {
        let q = |name: &str| catalog.quote_if_needed(name);
        match self {
            Self::ParentPk {
                child_alias,
                components,
            } => components
                .iter()
                .map(|c| {
                    format!(
                        "{}.{} = {}.{}",
                        child_alias,
                        q(&c.foreign_key_field_name),
                        alias,
                        q(&format!("{}{}", pk_prefix, c.primary_key_field_name))
                    )
                })
                .collect::<Vec<_>>()
                .join(" and "),
            Self::ChildFk {
                parent_alias,
                components,
            } => components
                .iter()
                .map(|c| {
                    format!(
                        "{}.{} = {}.{}",
                        alias,
                        q(&c.foreign_key_field_name),
                        parent_alias,
                        q(&format!("{}{}", pk_prefix, c.primary_key_field_name))
                    )
                })
                .collect::<Vec<_>>()
                .join(" and "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CustomJoinCondition, FieldPair, ReferencedParentSpec, TableJsonSpec};
    use crate::dbmd::{CaseSensitivity, DatabaseMetadata, RelType, jdbc_types};

    fn field(name: &str, pk: Option<u32>, nullable: bool) -> Field {
        Field {
            name: name.to_string(),
            jdbc_type_code: jdbc_types::INTEGER,
            database_type: "int4".to_string(),
            length: None,
            precision: None,
            fractional_digits: None,
            nullable: Some(nullable),
            primary_key_part_number: pk,
            comment: None,
        }
    }

    fn catalog() -> DatabaseMetadata {
        let rel = |name: &str, fields| RelMetadata {
            relation_id: RelId::new(None, name),
            relation_type: RelType::Table,
            fields,
            comment: None,
        };
        let fk = |col: &str| ForeignKey {
            constraint_name: None,
            foreign_key_relation_id: RelId::new(None, "message"),
            primary_key_relation_id: RelId::new(None, "person"),
            foreign_key_components: vec![FkComponent {
                foreign_key_field_name: col.to_string(),
                primary_key_field_name: "id".to_string(),
            }],
        };
        DatabaseMetadata::new(
            None,
            vec![
                rel("person", vec![field("id", Some(1), false)]),
                rel(
                    "message",
                    vec![
                        field("id", Some(1), false),
                        field("sender_id", None, false),
                        field("recipient_id", None, true),
                        field("topic_id", None, true),
                    ],
                ),
                rel("topic", vec![field("id", Some(1), false)]),
            ],
            vec![fk("sender_id"), fk("recipient_id")],
            CaseSensitivity::InsensitiveStoredLower,
            "PostgreSQL",
        )
    }

    fn rel_id(name: &str) -> RelId {
        RelId::new(None, name)
    }

    #[test]
    fn test_resolve_ambiguous_without_hint() {
        let dbmd = catalog();
        let err = resolve_foreign_key(&dbmd, &rel_id("message"), &rel_id("person"), None)
            .unwrap_err();
        match err {
            SpecErrorKind::AmbiguousForeignKey { candidates, .. } => {
                assert_eq!(
                    candidates,
                    vec![vec!["recipient_id".to_string()], vec!["sender_id".to_string()]]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_with_hint() {
        let dbmd = catalog();
        let hint = vec!["SENDER_ID".to_string()];
        let fk = resolve_foreign_key(&dbmd, &rel_id("message"), &rel_id("person"), Some(&hint))
            .unwrap();
        assert_eq!(fk.child_field_names(), vec!["sender_id"]);

        let bad = vec!["topic_id".to_string()];
        let err = resolve_foreign_key(&dbmd, &rel_id("message"), &rel_id("person"), Some(&bad))
            .unwrap_err();
        assert!(matches!(err, SpecErrorKind::AmbiguousOrMissingForeignKey { .. }));
    }

    #[test]
    fn test_resolve_not_found() {
        let dbmd = catalog();
        let err =
            resolve_foreign_key(&dbmd, &rel_id("person"), &rel_id("message"), None).unwrap_err();
        assert!(matches!(err, SpecErrorKind::ForeignKeyNotFound { .. }));
    }

    #[test]
    fn test_custom_join_components() {
        let dbmd = catalog();
        let message = dbmd.relation(&rel_id("message")).unwrap();
        let topic = dbmd.relation(&rel_id("topic")).unwrap();
        let mut spec = ReferencedParentSpec {
            reference_name: "topic".into(),
            table_json: TableJsonSpec::new("topic"),
            via_foreign_key_fields: None,
            custom_join_condition: Some(CustomJoinCondition {
                equated_fields: vec![FieldPair {
                    child_field: "topic_id".into(),
                    parent_primary_key_field: "id".into(),
                }],
            }),
            optional: false,
        };
        let loc = SpecLocation::new("q");
        let comps =
            join_components(&dbmd, RelatedSpec::ReferencedParent(&spec), message, topic, &loc)
                .unwrap();
        assert_eq!(comps[0].foreign_key_field_name, "topic_id");
        assert!(join_fields_nullable(message, &comps));

        spec.via_foreign_key_fields = Some(vec!["topic_id".into()]);
        let err =
            join_components(&dbmd, RelatedSpec::ReferencedParent(&spec), message, topic, &loc)
                .unwrap_err();
        assert!(matches!(err.kind, SpecErrorKind::InvalidSpecification(_)));
    }

    #[test]
    fn test_condition_equations() {
        let dbmd = catalog();
        let components = vec![FkComponent {
            foreign_key_field_name: "sender_id".into(),
            primary_key_field_name: "id".into(),
        }];
        let parent_pk = ParentChildCondition::ParentPk {
            child_alias: "m".into(),
            components: components.clone(),
        };
        assert_eq!(parent_pk.as_equation_on("p", &dbmd, ""), "m.sender_id = p.id");
        assert_eq!(parent_pk.as_equation_on("q", &dbmd, "_"), "m.sender_id = q.\"_id\"");
        let child_fk = ParentChildCondition::ChildFk {
            parent_alias: "p".into(),
            components,
        };
        assert_eq!(child_fk.as_equation_on("m", &dbmd, ""), "m.sender_id = p.id");
        assert_eq!(child_fk.other_alias(), "p");
    }
}
