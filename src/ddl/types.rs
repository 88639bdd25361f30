//! Column type declarations to JDBC type codes.

use super::DbProduct;
use crate::dbmd::jdbc_types::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub jdbc_type_code: i32,
    pub database_type: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub fractional_digits: Option<u32>,
}

/// Map a declared column type such as `varchar(50)` or `NUMBER(10,2)`.
pub fn map_type(declared: &str, product: DbProduct) -> ColumnType {
    let lower = declared.to_lowercase();
    let (base, args) = split_type_args(&lower);
    let base = base.as_str();

    let (code, db_type) = match product {
        DbProduct::PostgreSQL => map_postgres_type(base),
        DbProduct::Oracle => map_oracle_type(base),
        DbProduct::Auto | DbProduct::Generic => map_generic_type(base),
    };

    let first = args.first().copied();
    let second = args.get(1).copied();
    let (length, precision, fractional_digits) = match code {
        CHAR | VARCHAR | BINARY | VARBINARY => (first, None, None),
        NUMERIC | DECIMAL => (None, first, second.or(first.map(|_| 0))),
        _ => (None, None, None),
    };

    ColumnType {
        jdbc_type_code: code,
        database_type: db_type.to_string(),
        length,
        precision,
        fractional_digits,
    }
}

/// Split `numeric(10,2)` into `numeric` and `[10, 2]`. Text after the
/// arguments is kept in the base name, as in `timestamp(3) with time zone`.
fn split_type_args(lower: &str) -> (String, Vec<u32>) {
    match (lower.find('('), lower.find(')')) {
        (Some(open), Some(close)) if open < close => {
            let args = lower[open + 1..close]
                .split(',')
                .filter_map(|a| a.trim().parse().ok())
                .collect();
            let base = format!("{} {}", lower[..open].trim(), lower[close + 1..].trim());
            (base.trim().to_string(), args)
        }
        _ => (lower.trim().to_string(), Vec::new()),
    }
}

fn map_postgres_type(base: &str) -> (i32, &str) {
    match base {
        "int" | "int4" | "integer" | "serial" | "serial4" => (INTEGER, "int4"),
        "bigint" | "int8" | "bigserial" | "serial8" => (BIGINT, "int8"),
        "smallint" | "int2" | "smallserial" | "serial2" => (SMALLINT, "int2"),
        "real" | "float4" => (REAL, "float4"),
        "double precision" | "float8" | "float" => (DOUBLE, "float8"),
        "decimal" | "numeric" => (NUMERIC, "numeric"),
        "varchar" | "character varying" => (VARCHAR, "varchar"),
        "char" | "character" | "bpchar" => (CHAR, "bpchar"),
        "text" => (VARCHAR, "text"),
        "timestamp" | "timestamp without time zone" => (TIMESTAMP, "timestamp"),
        "timestamptz" | "timestamp with time zone" => (TIMESTAMP_WITH_TIMEZONE, "timestamptz"),
        "date" => (DATE, "date"),
        "time" | "time without time zone" => (TIME, "time"),
        "boolean" | "bool" => (BOOLEAN, "bool"),
        "bytea" => (BINARY, "bytea"),
        "json" => (OTHER, "json"),
        "jsonb" => (OTHER, "jsonb"),
        "uuid" => (OTHER, "uuid"),
        _ => (OTHER, base),
    }
}

fn map_oracle_type(base: &str) -> (i32, &str) {
    match base {
        "number" | "numeric" | "decimal" | "integer" | "int" | "smallint" => (NUMERIC, "NUMBER"),
        "float" | "binary_double" => (DOUBLE, "FLOAT"),
        "binary_float" => (REAL, "BINARY_FLOAT"),
        "varchar2" | "varchar" | "nvarchar2" => (VARCHAR, "VARCHAR2"),
        "char" | "nchar" => (CHAR, "CHAR"),
        "clob" | "nclob" => (CLOB, "CLOB"),
        "blob" => (BLOB, "BLOB"),
        "raw" => (VARBINARY, "RAW"),
        // Oracle dates carry a time part.
        "date" => (TIMESTAMP, "DATE"),
        "timestamp" => (TIMESTAMP, "TIMESTAMP"),
        "timestamp with time zone" => (TIMESTAMP_WITH_TIMEZONE, "TIMESTAMP WITH TIME ZONE"),
        _ => (OTHER, base),
    }
}

fn map_generic_type(base: &str) -> (i32, &str) {
    match base {
        "int" | "integer" => (INTEGER, "integer"),
        "bigint" => (BIGINT, "bigint"),
        "smallint" => (SMALLINT, "smallint"),
        "real" => (REAL, "real"),
        "float" | "double" | "double precision" => (DOUBLE, "double"),
        "decimal" | "numeric" => (NUMERIC, "numeric"),
        "varchar" | "character varying" => (VARCHAR, "varchar"),
        "char" | "character" => (CHAR, "char"),
        "text" | "clob" => (CLOB, "text"),
        "timestamp" | "datetime" => (TIMESTAMP, "timestamp"),
        "date" => (DATE, "date"),
        "time" => (TIME, "time"),
        "boolean" | "bool" => (BOOLEAN, "boolean"),
        "blob" => (BLOB, "blob"),
        _ => (OTHER, base),
    }
}
