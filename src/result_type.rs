//! Result type trees describing the rows produced by generated SQL.
//!
//! A [`GeneratedType`] mirrors one table spec node, with its fields in the
//! same order as the output columns of the node's base query.

use serde::Serialize;

use crate::ast::{RelatedSpec, TableJsonSpec};
use crate::config::CompileOptions;
use crate::dbmd::{Catalog, Field, RelMetadata};
use crate::error::{SpecError, SpecLocation};
use crate::naming::upper_camel_case;
use crate::query::json_property_name;
use crate::resolve::{field_for, join_components, join_fields_nullable, relation_for};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedType {
    pub type_name: String,
    pub fields: Vec<GeneratedField>,
    /// Set for child collections aggregating a single column's values.
    pub unwrapped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GeneratedField {
    Database {
        name: String,
        field: Field,
        nullable: bool,
        type_override: Option<String>,
    },
    Expression {
        name: String,
        expression: String,
        type_override: Option<String>,
    },
    ChildCollection {
        name: String,
        generated_type: GeneratedType,
        nullable: bool,
    },
    ParentReference {
        name: String,
        generated_type: GeneratedType,
        nullable: bool,
    },
}

impl GeneratedField {
    pub fn name(&self) -> &str {
        match self {
            Self::Database { name, .. }
            | Self::Expression { name, .. }
            | Self::ChildCollection { name, .. }
            | Self::ParentReference { name, .. } => name,
        }
    }

    /// Nullability, `None` for expressions whose type is unknown here.
    pub fn nullable(&self) -> Option<bool> {
        match self {
            Self::Database { nullable, .. }
            | Self::ChildCollection { nullable, .. }
            | Self::ParentReference { nullable, .. } => Some(*nullable),
            Self::Expression { .. } => None,
        }
    }

    fn into_nullable(self) -> Self {
        match self {
            Self::Database {
                name,
                field,
                type_override,
                ..
            } => Self::Database {
                name,
                field,
                nullable: true,
                type_override,
            },
            Self::ChildCollection {
                name,
                generated_type,
                ..
            } => Self::ChildCollection {
                name,
                generated_type,
                nullable: true,
            },
            Self::ParentReference {
                name,
                generated_type,
                ..
            } => Self::ParentReference {
                name,
                generated_type,
                nullable: true,
            },
            expr @ Self::Expression { .. } => expr,
        }
    }
}

impl GeneratedType {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(GeneratedField::name).collect()
    }

    pub fn database_fields(&self) -> Vec<&GeneratedField> {
        self.fields_where(|f| matches!(f, GeneratedField::Database { .. }))
    }

    pub fn expression_fields(&self) -> Vec<&GeneratedField> {
        self.fields_where(|f| matches!(f, GeneratedField::Expression { .. }))
    }

    pub fn child_collection_fields(&self) -> Vec<&GeneratedField> {
        self.fields_where(|f| matches!(f, GeneratedField::ChildCollection { .. }))
    }

    pub fn parent_reference_fields(&self) -> Vec<&GeneratedField> {
        self.fields_where(|f| matches!(f, GeneratedField::ParentReference { .. }))
    }

    fn fields_where(&self, pred: impl Fn(&GeneratedField) -> bool) -> Vec<&GeneratedField> {
        self.fields.iter().filter(|f| pred(f)).collect()
    }
}

pub struct ResultTypeBuilder<'c, 'o> {
    catalog: &'c dyn Catalog,
    options: &'o CompileOptions,
}

impl<'c, 'o> ResultTypeBuilder<'c, 'o> {
    pub fn new(catalog: &'c dyn Catalog, options: &'o CompileOptions) -> Self {
        Self { catalog, options }
    }

    pub fn build(&self, spec: &TableJsonSpec, loc: &SpecLocation) -> Result<GeneratedType, SpecError> {
        let rel = self.relation(spec, loc)?;
        let mut fields = Vec::new();

        let table_loc = loc.plus(format!("table '{}'", spec.table));
        for tfe in &spec.field_expressions {
            let name = json_property_name(tfe, self.options.output_field_name_default, &table_loc)?;
            let type_override = tfe.generated_field_type.clone();
            match (&tfe.field, &tfe.expression) {
                (Some(field_name), None) => {
                    let field = field_for(self.catalog, rel, field_name, &table_loc)?;
                    fields.push(GeneratedField::Database {
                        name,
                        field: field.clone(),
                        nullable: field.is_nullable(),
                        type_override,
                    });
                }
                (None, Some(expr)) => fields.push(GeneratedField::Expression {
                    name,
                    expression: expr.clone(),
                    type_override,
                }),
                _ => return Err(table_loc.invalid("field expression must have exactly one of field or expression")),
            }
        }

        for parent in &spec.inline_parent_tables {
            let related = RelatedSpec::InlineParent(parent);
            let parent_loc = loc.plus(related.describe());
            let parent_type = self.build(&parent.table_json, &parent_loc)?;
            let nullable = self.parent_may_be_absent(related, rel, &parent_loc)?;
            fields.extend(parent_type.fields.into_iter().map(|f| {
                if nullable { f.into_nullable() } else { f }
            }));
        }

        for parent in &spec.referenced_parent_tables {
            let related = RelatedSpec::ReferencedParent(parent);
            let parent_loc = loc.plus(related.describe());
            let generated_type = self.build(&parent.table_json, &parent_loc)?;
            let nullable = self.parent_may_be_absent(related, rel, &parent_loc)?;
            fields.push(GeneratedField::ParentReference {
                name: parent.reference_name.clone(),
                generated_type,
                nullable,
            });
        }

        for child in &spec.child_table_collections {
            let child_loc = loc.plus(RelatedSpec::ChildCollection(child).describe());
            let mut generated_type = self.build(&child.table_json, &child_loc)?;
            if child.unwrap() {
                if generated_type.fields.len() != 1 {
                    return Err(child_loc.invalid(format!(
                        "collection of '{}' rows cannot be unwrapped, it has {} output columns",
                        child.table_json.table,
                        generated_type.fields.len()
                    )));
                }
                generated_type.unwrapped = true;
            }
            fields.push(GeneratedField::ChildCollection {
                name: child.collection_name.clone(),
                generated_type,
                nullable: false,
            });
        }

        Ok(GeneratedType {
            type_name: upper_camel_case(&rel.relation_id.name),
            fields,
            unwrapped: false,
        })
    }

    /// Whether a child row may lack its parent row: the relationship is
    /// marked optional or filtered, or no join field is known NOT NULL.
    fn parent_may_be_absent(
        &self,
        related: RelatedSpec<'_>,
        child_rel: &RelMetadata,
        loc: &SpecLocation,
    ) -> Result<bool, SpecError> {
        if related.marked_optional() {
            return Ok(true);
        }
        let parent_rel = self.relation(related.table_json(), loc)?;
        let components = join_components(self.catalog, related, child_rel, parent_rel, loc)?;
        Ok(join_fields_nullable(child_rel, &components))
    }

    fn relation(&self, spec: &TableJsonSpec, loc: &SpecLocation) -> Result<&'c RelMetadata, SpecError> {
        relation_for(
            self.catalog,
            &spec.table,
            self.options.default_schema.as_deref(),
            loc,
        )
    }
}
