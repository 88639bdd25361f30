//! Database metadata from SQL schema dumps.

mod lexer;
mod parser;
mod product;
mod types;

pub use lexer::Token;
pub use parser::{DdlParseError, parse_ddl};
pub use product::DbProduct;
