//! JSON construction expressions for the supported database products.

use crate::ast::DEFAULT_TABLE_ALIAS_VAR;
use crate::error::CompileError;
use crate::naming::{indent_lines, un_double_quote};
use crate::query::SelectEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Oracle,
}

impl SqlDialect {
    /// Select the dialect from a database product name such as "PostgreSQL"
    /// or "Oracle Database 19c".
    pub fn from_product_name(product_name: &str) -> Result<Self, CompileError> {
        let lower = product_name.to_lowercase();
        if lower.contains("postgres") {
            Ok(Self::Postgres)
        } else if lower.contains("oracle") {
            Ok(Self::Oracle)
        } else {
            Err(CompileError::UnsupportedDialect(product_name.to_string()))
        }
    }

    /// Expression building one JSON object from the given columns of `alias`.
    /// Output names are double-quoted where needed.
    pub fn row_object_expression(&self, columns: &[SelectEntry], alias: &str, indent: usize) -> String {
        let decls = columns
            .iter()
            .map(|col| {
                let name = un_double_quote(&col.output_name);
                let value = self.column_value(col, alias);
                match self {
                    Self::Postgres => format!("'{}', {}", name, value),
                    Self::Oracle => format!("'{}' value {}", name, value),
                }
            })
            .collect::<Vec<_>>()
            .join(",\n");

        match self {
            Self::Postgres => format!(
                "jsonb_build_object(\n{}\n)",
                indent_lines(&decls, indent)
            ),
            Self::Oracle => format!(
                "json_object(\n{}\n{}returning clob\n)",
                indent_lines(&decls, indent),
                " ".repeat(indent)
            ),
        }
    }

    /// Expression aggregating row objects into a JSON array, which is empty
    /// (never null) when there are no rows.
    pub fn aggregated_row_objects_expression(
        &self,
        columns: &[SelectEntry],
        order_by: Option<&str>,
        alias: &str,
        indent: usize,
    ) -> String {
        let row_object = self.row_object_expression(columns, alias, indent);
        self.aggregate(&row_object, order_by, alias)
    }

    /// Expression aggregating the bare values of one column into a JSON array.
    pub fn aggregated_column_values_expression(
        &self,
        column: &SelectEntry,
        order_by: Option<&str>,
        alias: &str,
    ) -> String {
        self.aggregate(&self.column_value(column, alias), order_by, alias)
    }

    /// A column reference as a JSON value. Oracle subqueries yield their
    /// objects and arrays as CLOB text, which must be marked as JSON to nest
    /// rather than embed as a string.
    fn column_value(&self, col: &SelectEntry, alias: &str) -> String {
        match self {
            Self::Oracle if col.json_valued => format!("treat({}.{} as json)", alias, col.output_name),
            _ => format!("{}.{}", alias, col.output_name),
        }
    }

    fn aggregate(&self, value: &str, order_by: Option<&str>, alias: &str) -> String {
        let order = order_by
            .map(|ob| format!(" order by {}", ob.replace(DEFAULT_TABLE_ALIAS_VAR, alias)))
            .unwrap_or_default();
        match self {
            Self::Postgres => format!("coalesce(jsonb_agg({}{}),'[]'::jsonb)", value, order),
            Self::Oracle => format!(
                "treat(coalesce(json_arrayagg({}{} returning clob), to_clob('[]')) as json)",
                value, order
            ),
        }
    }
}
