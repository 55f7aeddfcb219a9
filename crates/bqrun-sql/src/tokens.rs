//! Table extraction from BigQuery scripts
//!
//! Uses the sqlparser tokenizer rather than the full parser: scripts mix
//! DDL, scripting statements and temporary functions that the AST does not
//! need to understand. Only the shape of `CREATE ... TABLE <name> ... AS`
//! (or `CLONE`/`COPY`/`LIKE <name>`) and backtick-quoted names matter.

use sqlparser::dialect::BigQueryDialect;
use sqlparser::tokenizer::{Token, Tokenizer, TokenizerError};

/// Words allowed between `CREATE [OR REPLACE]` and the object kind
const TABLE_MODIFIERS: [&str; 6] = [
    "TEMP",
    "TEMPORARY",
    "MATERIALIZED",
    "EXTERNAL",
    "SNAPSHOT",
    "AGGREGATE",
];

/// Clauses creating a table from another one without a query
const COPY_CLAUSES: [&str; 3] = ["CLONE", "COPY", "LIKE"];

/// Tables written and read by one script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTables {
    /// Created tables, in statement order
    pub targets: Vec<String>,

    /// Read tables, deduplicated in first-seen order
    pub sources: Vec<String>,
}

/// Script tokenizing/shape errors
#[derive(Debug, thiserror::Error)]
pub enum SyntaxError {
    #[error("tokenizer error: {0}")]
    Tokenize(#[from] TokenizerError),

    #[error("expected {expected} but got '{found}'")]
    UnexpectedToken { expected: &'static str, found: String },
}

/// Extract created and read tables from a whole script
pub fn parse_script(sql: &str) -> Result<ScriptTables, SyntaxError> {
    let dialect = BigQueryDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize()?;

    let mut tables = ScriptTables::default();

    for statement in tokens.split(|t| matches!(t, Token::SemiColon)) {
        let significant = strip_insignificant(statement);
        if significant.is_empty() {
            continue;
        }
        analyze_statement(&significant, &mut tables)?;
    }

    Ok(tables)
}

/// Drop whitespace, comments and a leading `#standardSQL` marker
fn strip_insignificant(tokens: &[Token]) -> Vec<&Token> {
    let mut significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();

    if matches!(significant.first(), Some(Token::Sharp)) {
        let drop = if matches!(significant.get(1), Some(Token::Word(_))) { 2 } else { 1 };
        significant.drain(..drop);
    }

    significant
}

fn analyze_statement(tokens: &[&Token], tables: &mut ScriptTables) -> Result<(), SyntaxError> {
    if !is_word(tokens.first().copied(), "CREATE") {
        collect_sources(tokens, &mut tables.sources);
        return Ok(());
    }

    let mut pos = 1;
    if is_word(tokens.get(pos).copied(), "OR") {
        if !is_word(tokens.get(pos + 1).copied(), "REPLACE") {
            return Err(unexpected("REPLACE", tokens.get(pos + 1).copied()));
        }
        pos += 2;
    }
    while TABLE_MODIFIERS
        .iter()
        .any(|modifier| is_word(tokens.get(pos).copied(), modifier))
    {
        pos += 1;
    }

    let kind = tokens.get(pos).copied();
    if is_word(kind, "FUNCTION")
        || is_word(kind, "PROCEDURE")
        || (is_word(kind, "TABLE") && is_word(tokens.get(pos + 1).copied(), "FUNCTION"))
    {
        return Ok(());
    }
    if !is_word(kind, "TABLE") && !is_word(kind, "VIEW") {
        collect_sources(tokens, &mut tables.sources);
        return Ok(());
    }
    pos += 1;

    if is_word(tokens.get(pos).copied(), "IF") {
        pos += 3;
    }

    let (target, consumed, _) = object_name(&tokens[pos.min(tokens.len())..])
        .ok_or_else(|| unexpected("table name", tokens.get(pos).copied()))?;
    if !tables.targets.contains(&target) {
        tables.targets.push(target);
    }
    pos += consumed;

    let rest = &tokens[pos..];
    let body = rest.iter().position(|t| {
        is_word(Some(*t), "AS") || COPY_CLAUSES.iter().any(|clause| is_word(Some(*t), clause))
    });

    match body {
        Some(offset) if is_word(Some(rest[offset]), "AS") => {
            collect_sources(&rest[offset + 1..], &mut tables.sources);
        }
        // CLONE / COPY / LIKE read exactly the named table
        Some(offset) => {
            if let Some((source, _, _)) = object_name(&rest[offset + 1..]) {
                if !tables.sources.contains(&source) {
                    tables.sources.push(source);
                }
            }
        }
        None => {}
    }

    Ok(())
}

/// Push every name containing a backtick-quoted part
fn collect_sources(tokens: &[&Token], sources: &mut Vec<String>) {
    let mut pos = 0;
    while pos < tokens.len() {
        match object_name(&tokens[pos..]) {
            Some((name, consumed, true)) => {
                if !sources.contains(&name) {
                    sources.push(name);
                }
                pos += consumed;
            }
            Some((_, consumed, false)) => pos += consumed,
            None => pos += 1,
        }
    }
}

/// Read `word (. word)*` from the start of `tokens`
///
/// Returns the dotted name, the number of tokens consumed and whether any
/// part was backtick-quoted.
fn object_name(tokens: &[&Token]) -> Option<(String, usize, bool)> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut pos = 0;

    loop {
        match tokens.get(pos) {
            Some(Token::Word(word)) => {
                quoted |= word.quote_style == Some('`');
                parts.push(word.value.as_str());
                pos += 1;
            }
            _ => break,
        }

        let continues = matches!(tokens.get(pos), Some(Token::Period))
            && matches!(tokens.get(pos + 1), Some(Token::Word(_)));
        if !continues {
            break;
        }
        pos += 1;
    }

    if parts.is_empty() {
        None
    } else {
        Some((parts.join("."), pos, quoted))
    }
}

fn is_word(token: Option<&Token>, keyword: &str) -> bool {
    matches!(
        token,
        Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword)
    )
}

fn unexpected(expected: &'static str, found: Option<&Token>) -> SyntaxError {
    SyntaxError::UnexpectedToken {
        expected,
        found: found.map(ToString::to_string).unwrap_or_else(|| "end of statement".to_string()),
    }
}
