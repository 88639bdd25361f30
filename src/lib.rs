pub mod ast;
pub mod compile;
pub mod config;
pub mod dbmd;
pub mod ddl;
pub mod dialect;
pub mod error;
pub mod naming;
pub mod query;
pub mod resolve;
pub mod result_type;

use wasm_bindgen::prelude::*;

use ast::QueryGroupSpec;
use compile::compile_query_group;
use dbmd::DatabaseMetadata;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Compile a query group against database metadata, both given as JSON.
/// Returns the generated queries as a JSON array.
#[wasm_bindgen(js_name = "compileQueries")]
pub fn compile_queries(dbmd_json: &str, query_group_json: &str) -> Result<String, js_sys::Error> {
    compile_queries_json(dbmd_json, query_group_json).map_err(|e| js_sys::Error::new(&e))
}

fn compile_queries_json(dbmd_json: &str, query_group_json: &str) -> Result<String, String> {
    let dbmd: DatabaseMetadata =
        serde_json::from_str(dbmd_json).map_err(|e| format!("Invalid database metadata: {}", e))?;
    let group: QueryGroupSpec =
        serde_json::from_str(query_group_json).map_err(|e| format!("Invalid query group: {}", e))?;
    let queries = compile_query_group(&dbmd, &group).map_err(|e| e.to_string())?;
    serde_json::to_string(&queries).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_queries_json() {
        let dbmd = ddl::parse_ddl("-- PostgreSQL database dump\nCREATE TABLE pet (id INT PRIMARY KEY, name TEXT);", None)
            .unwrap();
        let dbmd_json = serde_json::to_string(&dbmd).unwrap();
        let group_json = r#"{
            "querySpecs": [{
                "queryName": "pets",
                "tableJson": {"table": "pet", "fieldExpressions": [{"field": "name"}]}
            }]
        }"#;

        let out = compile_queries_json(&dbmd_json, group_json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["queryName"], "pets");
        assert!(value[0]["sqls"]["JSON_OBJECT_ROWS"].as_str().unwrap().contains("jsonb_build_object"));
        assert_eq!(value[0]["resultType"]["typeName"], "Pet");
    }

    #[test]
    fn test_compile_queries_json_errors() {
        assert!(compile_queries_json("{", "{}").unwrap_err().starts_with("Invalid database metadata"));
    }
}
