use std::fmt;
use thiserror::Error;

/// Where in a query's specification an error was found: the query name
/// followed by the path of nested related-table specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecLocation {
    pub query_name: String,
    pub parts: Vec<String>,
}

impl SpecLocation {
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            parts: Vec::new(),
        }
    }

    /// A location one level deeper.
    pub fn plus(&self, part: impl Into<String>) -> Self {
        let mut parts = self.parts.clone();
        parts.push(part.into());
        Self {
            query_name: self.query_name.clone(),
            parts,
        }
    }

    pub fn error(&self, kind: SpecErrorKind) -> SpecError {
        SpecError {
            location: self.clone(),
            kind,
        }
    }

    pub fn invalid(&self, message: impl Into<String>) -> SpecError {
        self.error(SpecErrorKind::InvalidSpecification(message.into()))
    }
}

impl fmt::Display for SpecLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query '{}'", self.query_name)?;
        for part in &self.parts {
            write!(f, " / {}", part)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecErrorKind {
    #[error("relation '{0}' not found")]
    UnknownRelation(String),
    #[error("field '{field}' not found in relation '{relation}'")]
    UnknownField { relation: String, field: String },
    #[error("no foreign key found from '{child}' to '{parent}'")]
    ForeignKeyNotFound { child: String, parent: String },
    #[error(
        "multiple foreign keys from '{child}' to '{parent}', specify foreign key fields to choose one of: {}",
        format_candidates(.candidates)
    )]
    AmbiguousForeignKey {
        child: String,
        parent: String,
        candidates: Vec<Vec<String>>,
    },
    #[error("no foreign key from '{child}' to '{parent}' with fields [{}]", .fields.join(", "))]
    AmbiguousOrMissingForeignKey {
        child: String,
        parent: String,
        fields: Vec<String>,
    },
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),
}

fn format_candidates(candidates: &[Vec<String>]) -> String {
    candidates
        .iter()
        .map(|fields| format!("[{}]", fields.join(", ")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {kind}")]
pub struct SpecError {
    pub location: SpecLocation,
    pub kind: SpecErrorKind,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("unsupported database product '{0}', expected PostgreSQL or Oracle")]
    UnsupportedDialect(String),
}
