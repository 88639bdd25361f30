//! Schema dump parser: CREATE TABLE / CREATE VIEW / ALTER TABLE statements
//! to database metadata.

use std::collections::HashMap;

use thiserror::Error;

use super::lexer::{Token, tokenize};
use super::types::map_type;
use super::DbProduct;
use crate::dbmd::{CaseSensitivity, DatabaseMetadata, Field, FkComponent, ForeignKey, RelId, RelMetadata, RelType};

#[derive(Debug, Error)]
pub enum DdlParseError {
    #[error("Expected {expected}, found {found:?}")]
    Expected { expected: String, found: Token },
    #[error("Unknown database product: {0}")]
    UnknownProduct(String),
}

/// Build database metadata from a SQL schema dump. The product (and with
/// it type mapping and identifier case rules) is detected from the dump
/// unless given.
pub fn parse_ddl(input: &str, product: Option<&str>) -> Result<DatabaseMetadata, DdlParseError> {
    let product = match product {
        Some(name) => {
            DbProduct::from_str(name).ok_or_else(|| DdlParseError::UnknownProduct(name.to_string()))?
        }
        None => DbProduct::Auto,
    }
    .resolve(input);

    let tokens = tokenize(input);
    let mut parser = Parser::new(tokens, product);
    parser.parse()?;
    Ok(parser.into_metadata())
}

struct TableDef {
    rel_id: RelId,
    rel_type: RelType,
    fields: Vec<Field>,
    pk_fields: Vec<String>,
}

struct FkDef {
    constraint_name: Option<String>,
    child: RelId,
    child_fields: Vec<String>,
    parent: RelId,
    /// Empty when the parent's primary key is referenced implicitly.
    parent_fields: Vec<String>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    product: DbProduct,
    case: CaseSensitivity,
    tables: Vec<TableDef>,
    table_index: HashMap<RelId, usize>,
    fks: Vec<FkDef>,
    default_schema: Option<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>, product: DbProduct) -> Self {
        Self {
            tokens,
            pos: 0,
            product,
            case: product.case_sensitivity(),
            tables: Vec::new(),
            table_index: HashMap::new(),
            fks: Vec::new(),
            default_schema: None,
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at_word(&self, word: &str) -> bool {
        matches!(self.current(), Token::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    fn parse(&mut self) -> Result<(), DdlParseError> {
        while self.current() != &Token::Eof {
            match self.current() {
                Token::Create => {
                    self.advance();
                    self.parse_create()?;
                }
                Token::Alter => {
                    self.advance();
                    self.parse_alter_table()?;
                }
                _ => self.advance(),
            }
        }
        Ok(())
    }

    fn parse_create(&mut self) -> Result<(), DdlParseError> {
        // CREATE [OR REPLACE] [GLOBAL|LOCAL] [TEMPORARY|TEMP] [UNLOGGED] ...
        while self.at_word("or")
            || self.at_word("replace")
            || self.at_word("global")
            || self.at_word("local")
            || self.at_word("temporary")
            || self.at_word("temp")
            || self.at_word("unlogged")
            || self.at_word("force")
        {
            self.advance();
        }

        match self.current() {
            Token::Table => {
                self.advance();
                self.skip_if_not_exists();
                match self.qualified_name() {
                    Some(rel_id) => self.parse_table_body(rel_id),
                    None => {
                        self.skip_statement();
                        Ok(())
                    }
                }
            }
            Token::View => {
                self.advance();
                self.skip_if_not_exists();
                if let Some(rel_id) = self.qualified_name() {
                    let columns = self.parse_column_list();
                    let fields = columns
                        .into_iter()
                        .map(|name| Field {
                            name,
                            jdbc_type_code: crate::dbmd::jdbc_types::OTHER,
                            database_type: "unknown".to_string(),
                            length: None,
                            precision: None,
                            fractional_digits: None,
                            nullable: None,
                            primary_key_part_number: None,
                            comment: None,
                        })
                        .collect();
                    self.add_table(TableDef {
                        rel_id,
                        rel_type: RelType::View,
                        fields,
                        pk_fields: Vec::new(),
                    });
                }
                self.skip_statement();
                Ok(())
            }
            _ => {
                // Indexes, sequences, functions ...
                self.skip_statement();
                Ok(())
            }
        }
    }

    fn skip_if_not_exists(&mut self) {
        if self.current() == &Token::If {
            self.advance();
            if self.current() == &Token::Not {
                self.advance();
            }
            if self.current() == &Token::Exists {
                self.advance();
            }
        }
    }

    /// An identifier in stored form: unquoted names are case-normalized,
    /// quoted names kept as written.
    fn name(&mut self) -> Option<String> {
        let name = match self.current() {
            Token::Ident(s) => self.case.normalize(s),
            Token::QuotedIdent(s) => s.clone(),
            _ => return None,
        };
        self.advance();
        Some(name)
    }

    fn qualified_name(&mut self) -> Option<RelId> {
        let first = self.name()?;
        if self.current() == &Token::Dot {
            self.advance();
            let name = self.name()?;
            Some(RelId {
                schema: Some(first),
                name,
            })
        } else {
            Some(RelId {
                schema: None,
                name: first,
            })
        }
    }

    fn parse_table_body(&mut self, rel_id: RelId) -> Result<(), DdlParseError> {
        if self.current() != &Token::LParen {
            // CREATE TABLE ... AS SELECT, PARTITION OF ...
            self.skip_statement();
            return Ok(());
        }
        self.advance();

        let mut fields = Vec::new();
        let mut pk_fields: Vec<String> = Vec::new();
        let mut constraint_name: Option<String> = None;

        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    constraint_name = None;
                    self.advance();
                }
                Token::Constraint => {
                    self.advance();
                    constraint_name = self.name();
                }
                Token::Primary => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    pk_fields = self.parse_column_list();
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Foreign => {
                    if let Some(fk) = self.parse_foreign_key(&rel_id, constraint_name.take())? {
                        self.fks.push(fk);
                    }
                }
                Token::Unique | Token::Index | Token::Key | Token::Check => {
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Ident(_) | Token::QuotedIdent(_) => {
                    if self.at_word("like") || self.at_word("exclude") {
                        self.skip_until(&[Token::Comma, Token::RParen]);
                    } else if let Some(field) = self.parse_column(&rel_id, &mut pk_fields)? {
                        fields.push(field);
                    }
                }
                Token::Eof => {
                    return Err(DdlParseError::Expected {
                        expected: "')' closing table definition".to_string(),
                        found: Token::Eof,
                    });
                }
                _ => self.advance(),
            }
        }

        // Table options (ENGINE=, TABLESPACE ...)
        self.skip_statement();

        self.add_table(TableDef {
            rel_id,
            rel_type: RelType::Table,
            fields,
            pk_fields,
        });
        Ok(())
    }

    fn add_table(&mut self, table: TableDef) {
        if self.default_schema.is_none() {
            self.default_schema = table.rel_id.schema.clone();
        }
        self.table_index.insert(table.rel_id.clone(), self.tables.len());
        self.tables.push(table);
    }

    fn parse_column(
        &mut self,
        rel_id: &RelId,
        pk_fields: &mut Vec<String>,
    ) -> Result<Option<Field>, DdlParseError> {
        let Some(name) = self.name() else {
            return Ok(None);
        };

        let declared = self.parse_declared_type();
        if declared.is_empty() {
            self.skip_until(&[Token::Comma, Token::RParen]);
            return Ok(None);
        }
        let col_type = map_type(&declared, self.product);

        let mut not_null = false;
        let mut constraint_name: Option<String> = None;

        loop {
            match self.current() {
                Token::Comma | Token::RParen | Token::Eof => break,
                Token::Primary => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    not_null = true;
                    pk_fields.push(name.clone());
                }
                Token::Not => {
                    self.advance();
                    if self.current() == &Token::Null {
                        self.advance();
                        not_null = true;
                    }
                }
                Token::Default => {
                    self.advance();
                    self.skip_default_value();
                }
                Token::Constraint => {
                    self.advance();
                    constraint_name = self.name();
                }
                Token::References => {
                    self.advance();
                    let (parent, parent_fields) = self.parse_reference()?;
                    self.fks.push(FkDef {
                        constraint_name: constraint_name.take(),
                        child: rel_id.clone(),
                        child_fields: vec![name.clone()],
                        parent,
                        parent_fields,
                    });
                    self.skip_on_actions();
                }
                Token::Check => {
                    self.advance();
                    self.skip_parenthesized();
                }
                Token::LParen => self.skip_parenthesized(),
                _ => self.advance(),
            }
        }

        Ok(Some(Field {
            name,
            jdbc_type_code: col_type.jdbc_type_code,
            database_type: col_type.database_type,
            length: col_type.length,
            precision: col_type.precision,
            fractional_digits: col_type.fractional_digits,
            nullable: Some(!not_null),
            primary_key_part_number: None,
            comment: None,
        }))
    }

    /// Collect a column's declared type, e.g. `character varying(20)` or
    /// `NUMBER(10,2)`.
    fn parse_declared_type(&mut self) -> String {
        const STOP_WORDS: [&str; 6] = ["generated", "collate", "as", "identity", "comment", "encode"];
        let mut declared = String::new();
        let mut paren_depth = 0;

        loop {
            match self.current() {
                Token::Ident(word) if paren_depth == 0 => {
                    if STOP_WORDS.iter().any(|w| word.eq_ignore_ascii_case(w)) {
                        break;
                    }
                    if !declared.is_empty() {
                        declared.push(' ');
                    }
                    declared.push_str(word);
                }
                Token::LParen => {
                    paren_depth += 1;
                    declared.push('(');
                }
                Token::RParen if paren_depth > 0 => {
                    paren_depth -= 1;
                    declared.push(')');
                }
                Token::Num(n) if paren_depth > 0 => declared.push_str(n),
                Token::Ident(word) if paren_depth > 0 => declared.push_str(word),
                Token::Comma if paren_depth > 0 => declared.push(','),
                _ => break,
            }
            self.advance();
        }
        declared
    }

    fn skip_default_value(&mut self) {
        match self.current() {
            Token::Str(_) | Token::Num(_) | Token::Null => self.advance(),
            Token::Ident(_) => {
                self.advance();
                if self.current() == &Token::LParen {
                    self.skip_parenthesized();
                }
            }
            Token::LParen => self.skip_parenthesized(),
            _ => {}
        }
    }

    fn parse_reference(&mut self) -> Result<(RelId, Vec<String>), DdlParseError> {
        let parent = self.qualified_name().ok_or_else(|| DdlParseError::Expected {
            expected: "referenced table name".to_string(),
            found: self.current().clone(),
        })?;
        let columns = self.parse_column_list();
        Ok((parent, columns))
    }

    fn parse_foreign_key(
        &mut self,
        child: &RelId,
        constraint_name: Option<String>,
    ) -> Result<Option<FkDef>, DdlParseError> {
        self.advance(); // FOREIGN
        if self.current() != &Token::Key {
            return Ok(None);
        }
        self.advance(); // KEY

        let child_fields = self.parse_column_list();

        if self.current() != &Token::References {
            return Err(DdlParseError::Expected {
                expected: "REFERENCES".to_string(),
                found: self.current().clone(),
            });
        }
        self.advance();

        let (parent, parent_fields) = self.parse_reference()?;
        self.skip_on_actions();
        // DEFERRABLE, NOT VALID ...
        self.skip_until(&[Token::Comma, Token::RParen, Token::Semicolon]);

        Ok(Some(FkDef {
            constraint_name,
            child: child.clone(),
            child_fields,
            parent,
            parent_fields,
        }))
    }

    /// `(a, b, ...)`, or nothing when no parenthesized list follows.
    fn parse_column_list(&mut self) -> Vec<String> {
        let mut cols = Vec::new();

        if self.current() != &Token::LParen {
            return cols;
        }
        self.advance();

        loop {
            match self.current() {
                Token::Ident(_) | Token::QuotedIdent(_) => {
                    if let Some(name) = self.name() {
                        cols.push(name);
                    }
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                // ASC/DESC and expression fragments are words too; anything else is skipped.
                _ => self.advance(),
            }
        }

        cols
    }

    fn skip_on_actions(&mut self) {
        while self.current() == &Token::On {
            self.advance();
            if matches!(self.current(), Token::Delete | Token::Update) {
                self.advance();
            }
            match self.current() {
                Token::Cascade | Token::Restrict => self.advance(),
                Token::Ident(s) if s.eq_ignore_ascii_case("set") => {
                    self.advance();
                    if matches!(self.current(), Token::Null | Token::Default) {
                        self.advance();
                    }
                }
                Token::Ident(s) if s.eq_ignore_ascii_case("no") => {
                    self.advance();
                    if self.at_word("action") {
                        self.advance();
                    }
                }
                _ => {}
            }
        }
    }

    fn skip_parenthesized(&mut self) {
        if self.current() != &Token::LParen {
            return;
        }
        self.advance();
        let mut depth = 1;
        while depth > 0 {
            match self.current() {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                Token::Eof => break,
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_statement(&mut self) {
        while !matches!(self.current(), Token::Semicolon | Token::Eof) {
            self.advance();
        }
        if self.current() == &Token::Semicolon {
            self.advance();
        }
    }

    fn skip_until(&mut self, tokens: &[Token]) {
        while !tokens.contains(self.current()) && self.current() != &Token::Eof {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
    }

    /// ALTER TABLE [ONLY] [IF EXISTS] t ADD [CONSTRAINT c] PRIMARY KEY (...)
    /// or FOREIGN KEY (...) REFERENCES ...; other alterations are skipped.
    fn parse_alter_table(&mut self) -> Result<(), DdlParseError> {
        if self.current() != &Token::Table {
            self.skip_statement();
            return Ok(());
        }
        self.advance();
        if self.current() == &Token::If {
            self.advance();
            if self.current() == &Token::Exists {
                self.advance();
            }
        }
        if self.current() == &Token::Only {
            self.advance();
        }

        let Some(rel_id) = self.qualified_name() else {
            self.skip_statement();
            return Ok(());
        };

        if self.current() != &Token::Add {
            self.skip_statement();
            return Ok(());
        }
        self.advance();

        let mut constraint_name = None;
        if self.current() == &Token::Constraint {
            self.advance();
            constraint_name = self.name();
        }

        match self.current() {
            Token::Primary => {
                self.advance();
                if self.current() == &Token::Key {
                    self.advance();
                }
                let pk_fields = self.parse_column_list();
                match self.table_index.get(&rel_id) {
                    Some(&i) => self.tables[i].pk_fields = pk_fields,
                    None => tracing::warn!(table = %rel_id, "primary key for unknown table ignored"),
                }
            }
            Token::Foreign => {
                if let Some(fk) = self.parse_foreign_key(&rel_id, constraint_name)? {
                    self.fks.push(fk);
                }
            }
            _ => {}
        }
        self.skip_statement();
        Ok(())
    }

    fn into_metadata(self) -> DatabaseMetadata {
        let mut tables = self.tables;
        for table in &mut tables {
            for (i, pk) in table.pk_fields.iter().enumerate() {
                if let Some(field) = table.fields.iter_mut().find(|f| &f.name == pk) {
                    field.primary_key_part_number = Some(i as u32 + 1);
                    field.nullable = Some(false);
                }
            }
        }

        let lookup = |rel_id: &RelId, context: &RelId| -> Option<usize> {
            self.table_index.get(rel_id).copied().or_else(|| {
                // Unqualified references resolve in the referencing table's schema.
                match (&rel_id.schema, &context.schema) {
                    (None, Some(schema)) => self
                        .table_index
                        .get(&RelId {
                            schema: Some(schema.clone()),
                            name: rel_id.name.clone(),
                        })
                        .copied(),
                    _ => None,
                }
            })
        };

        let mut foreign_keys: Vec<ForeignKey> = Vec::new();
        for fk in &self.fks {
            let Some(parent_idx) = lookup(&fk.parent, &fk.child) else {
                tracing::warn!(child = %fk.child, parent = %fk.parent, "foreign key to unknown table ignored");
                continue;
            };
            let parent = &tables[parent_idx];
            let parent_fields = if fk.parent_fields.is_empty() {
                parent.pk_fields.clone()
            } else {
                fk.parent_fields.clone()
            };
            if parent_fields.len() != fk.child_fields.len() || parent_fields.is_empty() {
                tracing::warn!(child = %fk.child, parent = %fk.parent, "foreign key with mismatched fields ignored");
                continue;
            }

            let key = ForeignKey {
                constraint_name: fk.constraint_name.clone(),
                foreign_key_relation_id: fk.child.clone(),
                primary_key_relation_id: parent.rel_id.clone(),
                foreign_key_components: fk
                    .child_fields
                    .iter()
                    .zip(parent_fields)
                    .map(|(fk_field, pk_field)| FkComponent {
                        foreign_key_field_name: fk_field.clone(),
                        primary_key_field_name: pk_field,
                    })
                    .collect(),
            };
            let duplicate = foreign_keys.iter().any(|k| {
                k.foreign_key_relation_id == key.foreign_key_relation_id
                    && k.primary_key_relation_id == key.primary_key_relation_id
                    && k.foreign_key_components == key.foreign_key_components
            });
            if !duplicate {
                foreign_keys.push(key);
            }
        }

        let relations = tables
            .into_iter()
            .map(|t| RelMetadata {
                relation_id: t.rel_id,
                relation_type: t.rel_type,
                fields: t.fields,
                comment: None,
            })
            .collect();

        DatabaseMetadata::new(
            self.default_schema,
            relations,
            foreign_keys,
            self.case,
            self.product.product_name(),
        )
    }
}
