//! Compile options and loading of query specs and database metadata.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ast::{OutputFieldNameDefault, QueryGroupSpec, QuerySpec};
use crate::dbmd::{Catalog, DatabaseMetadata};
use crate::ddl::{DdlParseError, parse_ddl};

/// Settings shared by all queries of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub indent_spaces: usize,
    pub output_field_name_default: OutputFieldNameDefault,
    /// Schema for unqualified table names in specs.
    pub default_schema: Option<String>,
    /// Schemas whose tables are referenced without qualification in SQL.
    pub unqualified_schemas: HashSet<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            indent_spaces: 2,
            output_field_name_default: OutputFieldNameDefault::Camelcase,
            default_schema: None,
            unqualified_schemas: HashSet::new(),
        }
    }
}

impl CompileOptions {
    pub fn from_group(group: &QueryGroupSpec, catalog: &dyn Catalog) -> Self {
        Self {
            output_field_name_default: group.output_field_name_default,
            default_schema: group.default_schema.clone(),
            unqualified_schemas: group
                .generate_unqualified_names_for_schemas
                .iter()
                .map(|s| catalog.normalize_name(s))
                .collect(),
            ..Default::default()
        }
    }

    /// Options for one query, applying its own naming override.
    pub fn for_query(&self, query: &QuerySpec) -> Self {
        Self {
            output_field_name_default: query
                .output_field_name_default
                .unwrap_or(self.output_field_name_default),
            ..self.clone()
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid DDL: {0}")]
    Ddl(#[from] DdlParseError),
    #[error("Unknown file format: {0} (expected .json, .yaml or .yml)")]
    UnknownFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_query_group(text: &str, format: SpecFormat) -> Result<QueryGroupSpec, LoadError> {
    Ok(match format {
        SpecFormat::Json => serde_json::from_str(text)?,
        SpecFormat::Yaml => serde_yaml::from_str(text)?,
    })
}

/// Load a query group from a JSON or YAML file, by extension.
pub fn load_query_group(path: &Path) -> Result<QueryGroupSpec, LoadError> {
    let format = SpecFormat::from_path(path).ok_or_else(|| LoadError::UnknownFormat(path.to_path_buf()))?;
    let group = parse_query_group(&read(path)?, format)?;
    tracing::debug!(path = %path.display(), queries = group.query_specs.len(), "loaded query group");
    Ok(group)
}

/// Load database metadata from its JSON document.
pub fn load_dbmd(path: &Path) -> Result<DatabaseMetadata, LoadError> {
    let dbmd: DatabaseMetadata = serde_json::from_str(&read(path)?)?;
    tracing::debug!(
        path = %path.display(),
        relations = dbmd.relation_metadatas().len(),
        "loaded database metadata"
    );
    Ok(dbmd)
}

/// Load database metadata from a SQL schema dump.
pub fn load_ddl(path: &Path, product: Option<&str>) -> Result<DatabaseMetadata, LoadError> {
    let dbmd = parse_ddl(&read(path)?, product)?;
    tracing::debug!(
        path = %path.display(),
        product = %dbmd.dbms_name,
        relations = dbmd.relation_metadatas().len(),
        foreign_keys = dbmd.foreign_keys().len(),
        "loaded schema dump"
    );
    Ok(dbmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ResultRepr, TableJsonSpec};

    const GROUP_YAML: &str = "
defaultSchema: shop
outputFieldNameDefault: AS_IN_DB
generateUnqualifiedNamesForSchemas: [SHOP]
querySpecs:
  - queryName: orders query
    resultRepresentations: [JSON_ARRAY_ROW]
    outputFieldNameDefault: CAMELCASE
    tableJson:
      table: orders
      fieldExpressions:
        - field: id
        - field: placed_on
";

    #[test]
    fn test_parse_yaml_group() {
        let group = parse_query_group(GROUP_YAML, SpecFormat::Yaml).unwrap();
        assert_eq!(group.default_schema.as_deref(), Some("shop"));
        let query = &group.query_specs[0];
        assert_eq!(query.result_representations(), vec![ResultRepr::JsonArrayRow]);
        assert_eq!(query.table_json.field_expressions.len(), 2);
    }

    #[test]
    fn test_options_from_group() {
        let dbmd = parse_ddl("CREATE TABLE shop.orders (id INT PRIMARY KEY);", None).unwrap();
        let group = parse_query_group(GROUP_YAML, SpecFormat::Yaml).unwrap();
        let options = CompileOptions::from_group(&group, &dbmd);
        assert_eq!(options.output_field_name_default, OutputFieldNameDefault::AsInDb);
        assert!(options.unqualified_schemas.contains("shop"));
        assert_eq!(options.indent_spaces, 2);

        let query_options = options.for_query(&group.query_specs[0]);
        assert_eq!(query_options.output_field_name_default, OutputFieldNameDefault::Camelcase);
        assert_eq!(query_options.default_schema.as_deref(), Some("shop"));
    }

    #[test]
    fn test_spec_format_from_path() {
        assert_eq!(SpecFormat::from_path(Path::new("q.yml")), Some(SpecFormat::Yaml));
        assert_eq!(SpecFormat::from_path(Path::new("q.JSON")), Some(SpecFormat::Json));
        assert_eq!(SpecFormat::from_path(Path::new("q.txt")), None);
    }

    #[test]
    fn test_unknown_format_and_missing_file() {
        assert!(matches!(
            load_query_group(Path::new("queries.toml")),
            Err(LoadError::UnknownFormat(_))
        ));
        assert!(matches!(
            load_dbmd(Path::new("/nonexistent/dbmd.json")),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn test_load_files_roundtrip_through_disk() {
        let dir = std::env::temp_dir().join(format!("sqljson-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let ddl_path = dir.join("schema.sql");
        fs::write(&ddl_path, "CREATE TABLE orders (id INT PRIMARY KEY);").unwrap();
        let dbmd = load_ddl(&ddl_path, Some("postgres")).unwrap();
        assert_eq!(dbmd.dbms_name, "PostgreSQL");

        let dbmd_path = dir.join("dbmd.json");
        fs::write(&dbmd_path, serde_json::to_string(&dbmd).unwrap()).unwrap();
        let reloaded = load_dbmd(&dbmd_path).unwrap();
        assert_eq!(reloaded.relation_metadatas(), dbmd.relation_metadatas());

        let spec_path = dir.join("queries.json");
        let group = QueryGroupSpec {
            default_schema: None,
            output_field_name_default: OutputFieldNameDefault::Camelcase,
            generate_unqualified_names_for_schemas: Vec::new(),
            query_specs: vec![QuerySpec {
                query_name: "q".into(),
                table_json: TableJsonSpec::new("orders"),
                result_representations: None,
                generate_result_types: None,
                output_field_name_default: None,
                order_by: None,
                for_update: None,
            }],
        };
        fs::write(&spec_path, serde_json::to_string(&group).unwrap()).unwrap();
        assert_eq!(load_query_group(&spec_path).unwrap(), group);

        fs::remove_dir_all(&dir).unwrap();
    }
}
