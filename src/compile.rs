//! Compilation of query groups into SQL texts and result types.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ast::{QueryGroupSpec, QuerySpec, ResultRepr};
use crate::config::CompileOptions;
use crate::dbmd::Catalog;
use crate::dialect::SqlDialect;
use crate::error::{CompileError, SpecError, SpecLocation};
use crate::query::QuerySqlGenerator;
use crate::result_type::{GeneratedType, ResultTypeBuilder};

/// Everything generated for one query spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuery {
    pub query_name: String,
    pub sqls: BTreeMap<ResultRepr, String>,
    pub result_type: Option<GeneratedType>,
    /// Parameter names declared by the record conditions, in spec order.
    pub param_names: Vec<String>,
}

impl GeneratedQuery {
    pub fn sql(&self, repr: ResultRepr) -> Option<&str> {
        self.sqls.get(&repr).map(String::as_str)
    }
}

/// Compile every query of a group, failing on the first invalid query.
pub fn compile_query_group(
    catalog: &dyn Catalog,
    group: &QueryGroupSpec,
) -> Result<Vec<GeneratedQuery>, CompileError> {
    let dialect = SqlDialect::from_product_name(catalog.product_name())?;
    let options = CompileOptions::from_group(group, catalog);

    let queries = group
        .query_specs
        .iter()
        .map(|query| compile_query(catalog, dialect, &options.for_query(query), query))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        dialect = ?dialect,
        queries = queries.len(),
        "compiled query group"
    );
    Ok(queries)
}

pub fn compile_query(
    catalog: &dyn Catalog,
    dialect: SqlDialect,
    options: &CompileOptions,
    query: &QuerySpec,
) -> Result<GeneratedQuery, SpecError> {
    let sqls = QuerySqlGenerator::new(catalog, dialect, options).generate_sqls(query)?;

    let result_type = if query.generate_result_types() {
        let loc = SpecLocation::new(&query.query_name);
        Some(ResultTypeBuilder::new(catalog, options).build(&query.table_json, &loc)?)
    } else {
        None
    };

    let mut param_names: Vec<String> = Vec::new();
    for name in query.table_json.param_names() {
        if !param_names.contains(&name) {
            param_names.push(name);
        }
    }

    tracing::debug!(
        query = %query.query_name,
        representations = ?sqls.keys().collect::<Vec<_>>(),
        properties = query.table_json.json_properties_count(),
        params = param_names.len(),
        "compiled query"
    );

    Ok(GeneratedQuery {
        query_name: query.query_name.clone(),
        sqls,
        result_type,
        param_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{OutputFieldNameDefault, RecordCondition, TableFieldExpr, TableJsonSpec};
    use crate::ddl::parse_ddl;
    use crate::error::SpecErrorKind;

    fn group(queries: Vec<QuerySpec>) -> QueryGroupSpec {
        QueryGroupSpec {
            default_schema: None,
            output_field_name_default: OutputFieldNameDefault::Camelcase,
            generate_unqualified_names_for_schemas: Vec::new(),
            query_specs: queries,
        }
    }

    fn query(name: &str, table_json: TableJsonSpec) -> QuerySpec {
        QuerySpec {
            query_name: name.into(),
            table_json,
            result_representations: None,
            generate_result_types: None,
            output_field_name_default: None,
            order_by: None,
            for_update: None,
        }
    }

    #[test]
    fn test_compile_group() {
        let dbmd = parse_ddl("-- postgres\nCREATE TABLE account (id INT PRIMARY KEY, owner_name TEXT);", None).unwrap();
        let mut spec = TableJsonSpec::new("account");
        spec.field_expressions = vec![TableFieldExpr::field("owner_name")];
        spec.record_condition = Some(RecordCondition {
            sql: "$$.id = :id or $$.id = :id".into(),
            param_names: vec!["id".into(), "id".into()],
            with_table_alias_as: None,
        });
        let mut no_types = query("accounts bare", TableJsonSpec::new("account"));
        no_types.generate_result_types = Some(false);
        no_types.result_representations = Some(vec![ResultRepr::MultiColumnRows, ResultRepr::JsonArrayRow]);

        let generated = compile_query_group(&dbmd, &group(vec![query("accounts", spec), no_types])).unwrap();
        assert_eq!(generated.len(), 2);

        let accounts = &generated[0];
        assert_eq!(accounts.param_names, vec!["id"]);
        assert!(accounts.sql(ResultRepr::JsonObjectRows).is_some_and(|s| s.contains("'ownerName', q.\"ownerName\"")));
        assert_eq!(accounts.result_type.as_ref().map(|t| t.type_name.as_str()), Some("Account"));

        let bare = &generated[1];
        assert!(bare.result_type.is_none());
        assert_eq!(
            bare.sqls.keys().copied().collect::<Vec<_>>(),
            vec![ResultRepr::JsonArrayRow, ResultRepr::MultiColumnRows]
        );
    }

    #[test]
    fn test_unsupported_dialect() {
        let dbmd = parse_ddl("CREATE TABLE t (id INT);", Some("generic")).unwrap();
        let err = compile_query_group(&dbmd, &group(vec![])).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedDialect(_)));
    }

    #[test]
    fn test_first_invalid_query_fails_group() {
        let dbmd = parse_ddl("CREATE TABLE t (id INT);", Some("postgres")).unwrap();
        let err = compile_query_group(&dbmd, &group(vec![query("bad", TableJsonSpec::new("missing"))]))
            .unwrap_err();
        let CompileError::Spec(err) = err else {
            panic!("expected a spec error");
        };
        assert_eq!(err.location.query_name, "bad");
        assert_eq!(err.kind, SpecErrorKind::UnknownRelation("missing".into()));
    }
}
