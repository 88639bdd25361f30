use std::collections::HashSet;

use crate::naming::{indent_lines, lowercase_initials, make_name_not_in_set};

/// Where a select entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    NativeField,
    InlineParent,
    ParentReference,
    ChildCollection,
    HiddenPk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectEntry {
    pub expression: String,
    /// Output column name, double-quoted where needed.
    pub output_name: String,
    pub source: Source,
    /// The column holds a JSON object or array built by a subquery.
    pub json_valued: bool,
    pub comment: Option<String>,
}

impl SelectEntry {
    pub fn new(expression: impl Into<String>, output_name: impl Into<String>, source: Source) -> Self {
        Self {
            expression: expression.into(),
            output_name: output_name.into(),
            source,
            json_valued: matches!(source, Source::ParentReference | Source::ChildCollection),
            comment: None,
        }
    }

    /// Keep JSON-ness of a column re-selected from a derived table.
    pub fn with_json_valued(mut self, json_valued: bool) -> Self {
        self.json_valued = json_valued;
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    fn to_sql(&self) -> String {
        let sep = if self.output_name.starts_with('"') { " " } else { " as " };
        let entry = format!("{}{}{}", self.expression, sep, self.output_name);
        match &self.comment {
            Some(comment) => format!("{}\n{}", comment, entry),
            None => entry,
        }
    }
}

/// Clauses of one select query under construction.
///
/// Values are combined with [`SqlQueryParts::merge`] and the `with_*`
/// methods, each producing a new value.
#[derive(Debug, Clone, Default)]
pub struct SqlQueryParts {
    select_entries: Vec<SelectEntry>,
    from_entries: Vec<String>,
    where_entries: Vec<String>,
    order_by: Option<String>,
    aliases_in_scope: HashSet<String>,
}

impl SqlQueryParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_entries(&self) -> &[SelectEntry] {
        &self.select_entries
    }

    pub fn from_entries(&self) -> &[String] {
        &self.from_entries
    }

    pub fn aliases_in_scope(&self) -> &HashSet<String> {
        &self.aliases_in_scope
    }

    /// An alias for `relation_name` not already in scope: its lowercase
    /// initials, with a numeric suffix on collision.
    pub fn new_alias_for(&self, relation_name: &str) -> String {
        make_name_not_in_set(
            &lowercase_initials(relation_name, '_'),
            &self.aliases_in_scope,
            "",
        )
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases_in_scope.insert(alias.into());
        self
    }

    pub fn with_select(mut self, entry: SelectEntry) -> Self {
        self.select_entries.push(entry);
        self
    }

    pub fn with_from(mut self, entry: impl Into<String>) -> Self {
        self.from_entries.push(entry.into());
        self
    }

    pub fn with_where(mut self, entry: impl Into<String>) -> Self {
        self.where_entries.push(entry.into());
        self
    }

    pub fn with_order_by(mut self, order_by: Option<String>) -> Self {
        self.order_by = order_by;
        self
    }

    /// Append all of `other`'s entries after this value's, and union the
    /// alias scopes. An order by in `other` replaces this one.
    pub fn merge(mut self, other: SqlQueryParts) -> Self {
        self.select_entries.extend(other.select_entries);
        self.from_entries.extend(other.from_entries);
        self.where_entries.extend(other.where_entries);
        self.aliases_in_scope.extend(other.aliases_in_scope);
        if other.order_by.is_some() {
            self.order_by = other.order_by;
        }
        self
    }

    pub fn to_sql(&self, indent: usize) -> String {
        let select = self
            .select_entries
            .iter()
            .map(SelectEntry::to_sql)
            .collect::<Vec<_>>()
            .join(",\n");
        let mut sql = format!(
            "select\n{}\nfrom\n{}",
            indent_lines(&select, indent),
            indent_lines(&self.from_entries.join("\n"), indent)
        );
        if !self.where_entries.is_empty() {
            sql.push_str(&format!(
                "\nwhere (\n{}\n)",
                indent_lines(&self.where_entries.join(" and\n"), indent)
            ));
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(&format!("\norder by {}", order_by));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_alias_avoids_scope() {
        let parts = SqlQueryParts::new().with_alias("d");
        assert_eq!(parts.new_alias_for("drug"), "d1");
        assert_eq!(parts.new_alias_for("order_item"), "oi");
    }

    #[test]
    fn test_merge_keeps_order_and_unions_scope() {
        let a = SqlQueryParts::new()
            .with_alias("d")
            .with_select(SelectEntry::new("d.id", "id", Source::NativeField))
            .with_from("drug d");
        let b = SqlQueryParts::new()
            .with_alias("q")
            .with_select(SelectEntry::new("q.name", "name", Source::InlineParent))
            .with_from("left join (x) q on d.cid = q.\"_id\"");
        let merged = a.merge(b);
        let names: Vec<&str> = merged.select_entries().iter().map(|e| e.output_name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(merged.from_entries().len(), 2);
        assert!(merged.aliases_in_scope().contains("d"));
        assert!(merged.aliases_in_scope().contains("q"));
    }

    #[test]
    fn test_to_sql_layout() {
        let parts = SqlQueryParts::new()
            .with_select(SelectEntry::new("d.id", "id", Source::NativeField))
            .with_select(
                SelectEntry::new("d.mesh_id", "\"meshId\"", Source::NativeField)
                    .with_comment(Some("-- mesh".to_string())),
            )
            .with_from("drug d")
            .with_where("d.id > 1")
            .with_where("(d.mesh_id is not null)");
        assert_eq!(
            parts.to_sql(2),
            "select\n  d.id as id,\n  -- mesh\n  d.mesh_id \"meshId\"\nfrom\n  drug d\nwhere (\n  d.id > 1 and\n  (d.mesh_id is not null)\n)"
        );
    }

    #[test]
    fn test_to_sql_without_where() {
        let parts = SqlQueryParts::new()
            .with_select(SelectEntry::new("d.id", "id", Source::NativeField))
            .with_from("drug d")
            .with_order_by(Some("d.id".to_string()));
        assert_eq!(parts.to_sql(2), "select\n  d.id as id\nfrom\n  drug d\norder by d.id");
    }
}
