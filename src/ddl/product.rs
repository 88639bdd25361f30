//! Database product detection for schema dumps.

use crate::dbmd::CaseSensitivity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbProduct {
    /// Auto-detect from dump content
    #[default]
    Auto,
    Generic,
    PostgreSQL,
    Oracle,
}

impl DbProduct {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "generic" => Some(Self::Generic),
            "postgres" | "postgresql" | "pg" => Some(Self::PostgreSQL),
            "oracle" => Some(Self::Oracle),
            _ => None,
        }
    }

    pub fn detect(content: &str) -> Self {
        let lower = content.to_lowercase();

        if lower.contains("postgresql database dump")
            || lower.contains("pg_dump")
            || lower.contains("-- postgres")
        {
            return Self::PostgreSQL;
        }
        if lower.contains("-- oracle") || lower.contains("sqlplus") {
            return Self::Oracle;
        }

        if lower.contains("varchar2")
            || lower.contains("number(")
            || lower.contains("nvarchar2")
            || lower.contains("clob")
        {
            return Self::Oracle;
        }
        if lower.contains("serial")
            || lower.contains("timestamptz")
            || lower.contains("jsonb")
            || lower.contains("::text")
        {
            return Self::PostgreSQL;
        }

        Self::Generic
    }

    pub fn resolve(self, content: &str) -> Self {
        match self {
            Self::Auto => Self::detect(content),
            other => other,
        }
    }

    /// Product name as database introspection would report it.
    pub fn product_name(self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::Oracle => "Oracle",
            Self::Auto | Self::Generic => "Generic SQL",
        }
    }

    pub fn case_sensitivity(self) -> CaseSensitivity {
        match self {
            Self::Oracle => CaseSensitivity::InsensitiveStoredUpper,
            _ => CaseSensitivity::InsensitiveStoredLower,
        }
    }
}
