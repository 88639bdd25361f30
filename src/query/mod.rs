//! SQL generation for query specs.
//!
//! Every table spec compiles to a *base query* selecting its output columns
//! in a fixed order: hidden primary keys (when requested), native fields,
//! inline parent fields, referenced parent objects, child collections.
//! Related tables nest as derived tables (inline parents) or as scalar
//! subqueries built from the related table's own base query.

pub mod parts;

use std::collections::{BTreeMap, HashSet};

use crate::ast::{
    ChildCollectionSpec, DEFAULT_TABLE_ALIAS_VAR, InlineParentSpec, OutputFieldNameDefault,
    QuerySpec, ReferencedParentSpec, RelatedSpec, ResultRepr, TableFieldExpr, TableJsonSpec,
};
use crate::config::CompileOptions;
use crate::dbmd::{Catalog, RelId, RelMetadata};
use crate::dialect::SqlDialect;
use crate::error::{SpecError, SpecLocation};
use crate::naming::{indent_lines, make_name_not_in_set, un_double_quote};
use crate::resolve::{ParentChildCondition, field_for, join_components, relation_for};

pub use parts::{SelectEntry, Source, SqlQueryParts};

/// Prefix of the output names of hidden primary key columns.
pub const HIDDEN_PK_PREFIX: &str = "_";

/// Alias of the derived table wrapping a base query.
const WRAPPER_ALIAS: &str = "q";

#[derive(Debug, Clone)]
pub struct BaseQuery {
    pub sql: String,
    /// Output columns, hidden primary keys excluded.
    pub result_columns: Vec<SelectEntry>,
}

impl BaseQuery {
    pub fn result_column_names(&self) -> Vec<String> {
        self.result_columns
            .iter()
            .map(|e| e.output_name.clone())
            .collect()
    }
}

/// How a base query is embedded in its context.
#[derive(Debug, Clone, Default)]
pub struct BaseQueryParams<'a> {
    /// Correlation to a table whose alias is in scope.
    pub parent_cond: Option<ParentChildCondition>,
    pub export_hidden_pks: bool,
    /// Extra row condition, with `$$` for the table alias.
    pub filter: Option<&'a str>,
    /// Ordering of the base query itself, with `$$` for the table alias.
    pub order_by: Option<&'a str>,
}

pub struct QuerySqlGenerator<'c, 'o> {
    catalog: &'c dyn Catalog,
    dialect: SqlDialect,
    options: &'o CompileOptions,
}

impl<'c, 'o> QuerySqlGenerator<'c, 'o> {
    pub fn new(catalog: &'c dyn Catalog, dialect: SqlDialect, options: &'o CompileOptions) -> Self {
        Self {
            catalog,
            dialect,
            options,
        }
    }

    /// SQL for each result representation the query asks for.
    pub fn generate_sqls(&self, query: &QuerySpec) -> Result<BTreeMap<ResultRepr, String>, SpecError> {
        query
            .result_representations()
            .into_iter()
            .map(|repr| Ok((repr, self.query_sql(query, repr)?)))
            .collect()
    }

    pub fn query_sql(&self, query: &QuerySpec, repr: ResultRepr) -> Result<String, SpecError> {
        let loc = SpecLocation::new(&query.query_name);
        let spec = &query.table_json;
        let order_by = query.order_by.as_deref();

        if query.for_update() && repr != ResultRepr::MultiColumnRows {
            return Err(loc.invalid(format!(
                "for update is only allowed with MULTI_COLUMN_ROWS results, not {}",
                repr.as_str()
            )));
        }

        match repr {
            ResultRepr::MultiColumnRows => {
                let params = BaseQueryParams {
                    order_by,
                    ..Default::default()
                };
                let base = self.base_query(spec, params, &loc)?;
                Ok(if query.for_update() {
                    format!("{}\nfor update", base.sql)
                } else {
                    base.sql
                })
            }
            ResultRepr::JsonObjectRows => self.json_object_rows_sql(spec, None, order_by, &loc),
            ResultRepr::JsonArrayRow => {
                self.json_array_row_sql(spec, BaseQueryParams::default(), false, order_by, &loc)
            }
        }
    }

    pub fn base_query(
        &self,
        spec: &TableJsonSpec,
        params: BaseQueryParams<'_>,
        loc: &SpecLocation,
    ) -> Result<BaseQuery, SpecError> {
        let rel = self.relation(spec, loc)?;

        let mut q = SqlQueryParts::new();
        if let Some(pc) = &params.parent_cond {
            q = q.with_alias(pc.other_alias());
        }
        let alias = q.new_alias_for(&rel.relation_id.name);
        q = q
            .with_alias(alias.clone())
            .with_from(format!("{} {}", self.minimal_rel_identifier(&rel.relation_id), alias));

        if params.export_hidden_pks {
            for pk in rel.primary_key_fields() {
                q = q.with_select(SelectEntry::new(
                    format!("{}.{}", alias, self.catalog.quote_if_needed(&pk.name)),
                    self.catalog
                        .quote_if_needed(&format!("{}{}", HIDDEN_PK_PREFIX, pk.name)),
                    Source::HiddenPk,
                ));
            }
        }

        let table_loc = loc.plus(format!("table '{}'", spec.table));
        for tfe in &spec.field_expressions {
            let name = json_property_name(tfe, self.options.output_field_name_default, &table_loc)?;
            q = q.with_select(SelectEntry::new(
                self.field_expression_sql(tfe, rel, &alias, &table_loc)?,
                self.catalog.quote_if_needed(&name),
                Source::NativeField,
            ));
        }

        for parent in &spec.inline_parent_tables {
            let parent_loc = loc.plus(RelatedSpec::InlineParent(parent).describe());
            let parent_parts =
                self.inline_parent_parts(parent, rel, &alias, q.aliases_in_scope(), &parent_loc)?;
            q = q.merge(parent_parts);
        }

        for parent in &spec.referenced_parent_tables {
            let parent_loc = loc.plus(RelatedSpec::ReferencedParent(parent).describe());
            q = q.with_select(self.referenced_parent_entry(parent, rel, &alias, &parent_loc)?);
        }

        for child in &spec.child_table_collections {
            let child_loc = loc.plus(RelatedSpec::ChildCollection(child).describe());
            q = q.with_select(self.child_collection_entry(child, rel, &alias, &child_loc)?);
        }

        if let Some(pc) = &params.parent_cond {
            q = q.with_where(pc.as_equation_on(&alias, self.catalog, ""));
        }
        if let Some(filter) = params.filter {
            q = q.with_where(format!("({})", filter.replace(DEFAULT_TABLE_ALIAS_VAR, &alias)));
        }
        if let Some(cond) = &spec.record_condition {
            let alias_var = cond
                .with_table_alias_as
                .as_deref()
                .unwrap_or(DEFAULT_TABLE_ALIAS_VAR);
            q = q.with_where(format!("({})", cond.sql.replace(alias_var, &alias)));
        }
        q = q.with_order_by(
            params
                .order_by
                .map(|ob| ob.replace(DEFAULT_TABLE_ALIAS_VAR, &alias)),
        );

        check_unique_output_names(&q, &table_loc)?;

        Ok(BaseQuery {
            sql: q.to_sql(self.options.indent_spaces),
            result_columns: q
                .select_entries()
                .iter()
                .filter(|e| e.source != Source::HiddenPk)
                .cloned()
                .collect(),
        })
    }

    /// A query returning one JSON object per row of the table.
    fn json_object_rows_sql(
        &self,
        spec: &TableJsonSpec,
        parent_cond: Option<ParentChildCondition>,
        order_by: Option<&str>,
        loc: &SpecLocation,
    ) -> Result<String, SpecError> {
        let params = BaseQueryParams {
            parent_cond,
            ..Default::default()
        };
        let base = self.base_query(spec, params, loc)?;
        let row_object = self.dialect.row_object_expression(
            &base.result_columns,
            WRAPPER_ALIAS,
            self.options.indent_spaces,
        );

        let mut sql = format!(
            "select\n{}\n{} json\nfrom (\n{}\n{}\n) {}",
            self.indent(&format!("-- row object builder for table '{}'", spec.table)),
            self.indent(&row_object),
            self.indent(&format!("-- base query for table '{}'", spec.table)),
            self.indent(&base.sql),
            WRAPPER_ALIAS
        );
        if let Some(ob) = order_by {
            sql.push_str(&format!(
                "\norder by {}",
                ob.replace(DEFAULT_TABLE_ALIAS_VAR, WRAPPER_ALIAS)
            ));
        }
        Ok(sql)
    }

    /// A query returning a single row holding the JSON array of the table's
    /// row objects, or of its single column's values when `unwrap` is set.
    ///
    /// Without an explicit ordering, elements are ordered by primary key
    /// when the table has one.
    fn json_array_row_sql(
        &self,
        spec: &TableJsonSpec,
        params: BaseQueryParams<'_>,
        unwrap: bool,
        order_by: Option<&str>,
        loc: &SpecLocation,
    ) -> Result<String, SpecError> {
        let rel = self.relation(spec, loc)?;
        let pk_order = match order_by {
            Some(ob) => Some(ob.to_string()),
            None => {
                let pks = rel.primary_key_fields();
                if pks.is_empty() {
                    None
                } else {
                    Some(
                        pks.iter()
                            .map(|pk| {
                                format!(
                                    "{}.{}",
                                    DEFAULT_TABLE_ALIAS_VAR,
                                    self.catalog
                                        .quote_if_needed(&format!("{}{}", HIDDEN_PK_PREFIX, pk.name))
                                )
                            })
                            .collect::<Vec<_>>()
                            .join(", "),
                    )
                }
            }
        };
        let params = BaseQueryParams {
            export_hidden_pks: order_by.is_none() && pk_order.is_some(),
            ..params
        };
        let base = self.base_query(spec, params, loc)?;
        let columns = &base.result_columns;

        let aggregate = if unwrap {
            let [column] = columns.as_slice() else {
                return Err(loc.invalid(format!(
                    "collection of '{}' rows cannot be unwrapped, it has {} output columns",
                    spec.table,
                    columns.len()
                )));
            };
            self.dialect
                .aggregated_column_values_expression(column, pk_order.as_deref(), WRAPPER_ALIAS)
        } else {
            self.dialect.aggregated_row_objects_expression(
                columns,
                pk_order.as_deref(),
                WRAPPER_ALIAS,
                self.options.indent_spaces,
            )
        };

        Ok(format!(
            "select\n{}\n{} json\nfrom (\n{}\n{}\n) {}",
            self.indent(&format!(
                "-- aggregated row objects builder for table '{}'",
                spec.table
            )),
            self.indent(&aggregate),
            self.indent(&format!("-- base query for table '{}'", spec.table)),
            self.indent(&base.sql),
            WRAPPER_ALIAS
        ))
    }

    fn inline_parent_parts(
        &self,
        parent: &InlineParentSpec,
        child_rel: &RelMetadata,
        child_alias: &str,
        avoid_aliases: &HashSet<String>,
        loc: &SpecLocation,
    ) -> Result<SqlQueryParts, SpecError> {
        let related = RelatedSpec::InlineParent(parent);
        let parent_rel = self.relation(&parent.table_json, loc)?;
        let components = join_components(self.catalog, related, child_rel, parent_rel, loc)?;

        let params = BaseQueryParams {
            export_hidden_pks: true,
            ..Default::default()
        };
        let parent_query = self.base_query(&parent.table_json, params, loc)?;

        let parent_alias = make_name_not_in_set(WRAPPER_ALIAS, avoid_aliases, "");
        let mut q = SqlQueryParts::new().with_alias(parent_alias.clone());

        for (i, col) in parent_query.result_columns.iter().enumerate() {
            let comment = (i == 0).then(|| {
                format!(
                    "-- field(s) inlined from parent table '{}'",
                    parent.table_json.table
                )
            });
            q = q.with_select(
                SelectEntry::new(
                    format!("{}.{}", parent_alias, col.output_name),
                    col.output_name.clone(),
                    Source::InlineParent,
                )
                .with_json_valued(col.json_valued)
                .with_comment(comment),
            );
        }

        let join_cond = ParentChildCondition::ParentPk {
            child_alias: child_alias.to_string(),
            components,
        }
        .as_equation_on(&parent_alias, self.catalog, HIDDEN_PK_PREFIX);

        Ok(q.with_from(format!(
            "-- parent table '{}', joined for inlined fields\nleft join (\n{}\n) {} on {}",
            parent.table_json.table,
            self.indent(&parent_query.sql),
            parent_alias,
            join_cond
        )))
    }

    fn referenced_parent_entry(
        &self,
        parent: &ReferencedParentSpec,
        child_rel: &RelMetadata,
        child_alias: &str,
        loc: &SpecLocation,
    ) -> Result<SelectEntry, SpecError> {
        let related = RelatedSpec::ReferencedParent(parent);
        let parent_rel = self.relation(&parent.table_json, loc)?;
        let components = join_components(self.catalog, related, child_rel, parent_rel, loc)?;
        let cond = ParentChildCondition::ParentPk {
            child_alias: child_alias.to_string(),
            components,
        };

        let parent_query = self.json_object_rows_sql(&parent.table_json, Some(cond), None, loc)?;

        Ok(SelectEntry::new(
            format!(
                "-- parent table '{}' referenced as '{}'\n(\n{}\n)",
                parent.table_json.table,
                parent.reference_name,
                self.indent(&parent_query)
            ),
            self.catalog.quote_if_needed(&parent.reference_name),
            Source::ParentReference,
        ))
    }

    fn child_collection_entry(
        &self,
        child: &ChildCollectionSpec,
        parent_rel: &RelMetadata,
        parent_alias: &str,
        loc: &SpecLocation,
    ) -> Result<SelectEntry, SpecError> {
        let related = RelatedSpec::ChildCollection(child);
        let child_rel = self.relation(&child.table_json, loc)?;
        let components = join_components(self.catalog, related, child_rel, parent_rel, loc)?;

        let params = BaseQueryParams {
            parent_cond: Some(ParentChildCondition::ChildFk {
                parent_alias: parent_alias.to_string(),
                components,
            }),
            filter: child.filter.as_deref(),
            ..Default::default()
        };
        let child_query = self.json_array_row_sql(
            &child.table_json,
            params,
            child.unwrap(),
            child.order_by.as_deref(),
            loc,
        )?;

        Ok(SelectEntry::new(
            format!(
                "-- records from child table '{}' as collection '{}'\n(\n{}\n)",
                child.table_json.table,
                child.collection_name,
                self.indent(&child_query)
            ),
            self.catalog.quote_if_needed(&child.collection_name),
            Source::ChildCollection,
        ))
    }

    fn field_expression_sql(
        &self,
        tfe: &TableFieldExpr,
        rel: &RelMetadata,
        alias: &str,
        loc: &SpecLocation,
    ) -> Result<String, SpecError> {
        match (&tfe.field, &tfe.expression) {
            (Some(field), None) => {
                field_for(self.catalog, rel, field, loc)?;
                Ok(format!("{}.{}", alias, field))
            }
            (None, Some(expr)) => {
                let alias_var = tfe
                    .with_table_alias_as
                    .as_deref()
                    .unwrap_or(DEFAULT_TABLE_ALIAS_VAR);
                Ok(expr.replace(alias_var, alias))
            }
            _ => Err(loc.invalid("field expression must have exactly one of field or expression")),
        }
    }

    fn relation(&self, spec: &TableJsonSpec, loc: &SpecLocation) -> Result<&'c RelMetadata, SpecError> {
        relation_for(
            self.catalog,
            &spec.table,
            self.options.default_schema.as_deref(),
            loc,
        )
    }

    /// Relation identifier, unqualified when its schema is absent or listed
    /// for unqualified names.
    fn minimal_rel_identifier(&self, rel_id: &RelId) -> String {
        match &rel_id.schema {
            Some(schema) if !self.options.unqualified_schemas.contains(schema) => {
                rel_id.id_string()
            }
            _ => rel_id.name.clone(),
        }
    }

    fn indent(&self, text: &str) -> String {
        indent_lines(text, self.options.indent_spaces)
    }
}

/// Output property name of a field expression, unquoted.
pub fn json_property_name(
    tfe: &TableFieldExpr,
    naming: OutputFieldNameDefault,
    loc: &SpecLocation,
) -> Result<String, SpecError> {
    match (&tfe.field, &tfe.expression, &tfe.json_property) {
        (_, _, Some(prop)) if tfe.field.is_some() != tfe.expression.is_some() => Ok(prop.clone()),
        (Some(field), None, None) => Ok(naming.apply(un_double_quote(field))),
        (None, Some(expr), None) => Err(loc.invalid(format!(
            "json property required for expression field '{}'",
            expr
        ))),
        _ => Err(loc.invalid("field expression must have exactly one of field or expression")),
    }
}

fn check_unique_output_names(q: &SqlQueryParts, loc: &SpecLocation) -> Result<(), SpecError> {
    let mut seen = HashSet::new();
    for entry in q.select_entries() {
        let name = un_double_quote(&entry.output_name);
        if !seen.insert(name) {
            return Err(loc.invalid(format!("duplicate output name '{}'", name)));
        }
    }
    Ok(())
}
