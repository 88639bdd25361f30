//! Tokenizer for SQL schema dumps.
//!
//! Only what the DDL parser inspects gets a token of its own. Everything
//! else is an identifier, literal or punctuation, and characters with no
//! meaning to the parser (operators, casts) are dropped.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Create,
    Alter,
    Add,
    Table,
    View,
    Only,
    Primary,
    Key,
    Foreign,
    References,
    Not,
    Null,
    Unique,
    Default,
    On,
    Delete,
    Update,
    Cascade,
    Restrict,
    Constraint,
    Index,
    If,
    Exists,
    Check,

    Ident(String),
    /// A double-quoted (or backquoted) identifier, taken literally.
    QuotedIdent(String),
    Str(String),
    Num(String),

    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

const KEYWORDS: &[(&str, Token)] = &[
    ("CREATE", Token::Create),
    ("ALTER", Token::Alter),
    ("ADD", Token::Add),
    ("TABLE", Token::Table),
    ("VIEW", Token::View),
    ("ONLY", Token::Only),
    ("PRIMARY", Token::Primary),
    ("KEY", Token::Key),
    ("FOREIGN", Token::Foreign),
    ("REFERENCES", Token::References),
    ("NOT", Token::Not),
    ("NULL", Token::Null),
    ("UNIQUE", Token::Unique),
    ("DEFAULT", Token::Default),
    ("ON", Token::On),
    ("DELETE", Token::Delete),
    ("UPDATE", Token::Update),
    ("CASCADE", Token::Cascade),
    ("RESTRICT", Token::Restrict),
    ("CONSTRAINT", Token::Constraint),
    ("INDEX", Token::Index),
    ("IF", Token::If),
    ("EXISTS", Token::Exists),
    ("CHECK", Token::Check),
];

/// Split a schema dump into tokens, ending with [`Token::Eof`].
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut scanner = Scanner { src: input, pos: 0 };
    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_token() {
        tokens.push(token);
    }
    tokens.push(Token::Eof);
    tokens
}

struct Scanner<'a> {
    src: &'a str,
    /// Byte offset of the next unread character.
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn first(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    /// Consume characters while `pred` holds and return them.
    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    /// Consume up to and including `end`, or to the end of input.
    fn skip_past(&mut self, end: &str) {
        self.pos = match self.rest().find(end) {
            Some(i) => self.pos + i + end.len(),
            None => self.src.len(),
        };
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            self.eat_while(char::is_whitespace);
            let c = self.first()?;
            let next = self.second();

            let token = match c {
                '-' if next == Some('-') => {
                    self.skip_past("\n");
                    continue;
                }
                '/' if next == Some('*') => {
                    self.pos += 2;
                    self.skip_past("*/");
                    continue;
                }
                '-' if next.is_some_and(|n| n.is_ascii_digit()) => {
                    self.pos += 1;
                    Token::Num(format!("-{}", self.number()))
                }
                '0'..='9' => Token::Num(self.number().to_string()),
                '"' | '`' => Token::QuotedIdent(self.quoted(c)),
                '\'' => Token::Str(self.quoted(c)),
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.eat_while(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '#'));
                    keyword(word).unwrap_or_else(|| Token::Ident(word.to_string()))
                }
                _ => {
                    self.pos += c.len_utf8();
                    match c {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        ',' => Token::Comma,
                        ';' => Token::Semicolon,
                        '.' => Token::Dot,
                        _ => continue,
                    }
                }
            };
            return Some(token);
        }
    }

    /// Digits with at most one decimal point.
    fn number(&mut self) -> &'a str {
        let start = self.pos;
        self.eat_while(|c| c.is_ascii_digit());
        if self.first() == Some('.') && self.second().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            self.eat_while(|c| c.is_ascii_digit());
        }
        &self.src[start..self.pos]
    }

    /// Text between `quote` characters; a doubled quote stands for itself.
    fn quoted(&mut self, quote: char) -> String {
        self.pos += quote.len_utf8();
        let mut text = String::new();
        loop {
            text.push_str(self.eat_while(|c| c != quote));
            if self.first().is_none() {
                break;
            }
            self.pos += quote.len_utf8();
            if self.first() == Some(quote) {
                text.push(quote);
                self.pos += quote.len_utf8();
            } else {
                break;
            }
        }
        text
    }
}

fn keyword(word: &str) -> Option<Token> {
    KEYWORDS
        .iter()
        .find(|(kw, _)| kw.eq_ignore_ascii_case(word))
        .map(|(_, token)| token.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_create_table() {
        assert_eq!(
            tokenize("CREATE TABLE drug (id INT);"),
            vec![
                Token::Create,
                Token::Table,
                Token::Ident("drug".to_string()),
                Token::LParen,
                Token::Ident("id".to_string()),
                Token::Ident("INT".to_string()),
                Token::RParen,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_identifiers_and_strings() {
        let tokens = tokenize(r#"CREATE TABLE "Drug ""X""" (note varchar DEFAULT 'it''s');"#);
        assert_eq!(tokens[2], Token::QuotedIdent("Drug \"X\"".to_string()));
        assert!(tokens.contains(&Token::Str("it's".to_string())));
    }

    #[test]
    fn test_comments_and_operators_skipped() {
        let tokens = tokenize("-- header\nCREATE /* block * */ VIEW v AS x::text / 2");
        assert_eq!(
            tokens,
            vec![
                Token::Create,
                Token::View,
                Token::Ident("v".to_string()),
                Token::Ident("AS".to_string()),
                Token::Ident("x".to_string()),
                Token::Ident("text".to_string()),
                Token::Num("2".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("numeric(10,2) DEFAULT -1.5");
        assert!(tokens.contains(&Token::Num("10".to_string())));
        assert!(tokens.contains(&Token::Num("-1.5".to_string())));
    }

    #[test]
    fn test_unterminated_input() {
        assert_eq!(tokenize("'abc"), vec![Token::Str("abc".to_string()), Token::Eof]);
        assert_eq!(tokenize("/* open"), vec![Token::Eof]);
        assert_eq!(tokenize("a.\"b"), vec![
            Token::Ident("a".to_string()),
            Token::Dot,
            Token::QuotedIdent("b".to_string()),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_keywords_any_case() {
        assert_eq!(tokenize("references"), vec![Token::References, Token::Eof]);
        assert_eq!(tokenize("Auto_Increment"), vec![Token::Ident("Auto_Increment".to_string()), Token::Eof]);
    }
}
