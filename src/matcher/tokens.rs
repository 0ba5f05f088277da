//! Tokenizer for counter updates such as `coffee++`, `tea--`, `foo+-` or `bar—`.
//!
//! Text is split on whitespace; every word ending in an operator run, possibly
//! followed by trailing punctuation (`coffee++!`, `tea--,`), is a candidate
//! match. The operator is the leftmost suffix that reaches the end
//! of the word, so `foo+--` is the name `foo+` with the operator `--`.
//! Increments are aggregated per lower-cased name, keeping first-seen order.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

const EM_DASH: &str = "—";

/// Operator suffixes that make a word a counter candidate
const OPERATOR_ENDINGS: [&str; 5] = ["++", "--", "+-", "-+", EM_DASH];

static MODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\++|-+|\+-|-\+|—)$").expect("valid regex"));

/// A named, signed counter delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Lower-cased name, the counter key
    pub name: String,
    /// Spelling of the first occurrence, used for display
    pub label: String,
    pub increment: i64,
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '+' | '-' | '—')
}

/// `coffee++!` -> `coffee++`. Operator characters are never stripped.
fn strip_trailing_punctuation(word: &str) -> &str {
    word.trim_end_matches(|c: char| c.is_ascii_punctuation() && !is_operator_char(c))
}

/// Words in `text` that look like counter updates.
/// Command invocations (text starting with `/`) never contain any.
pub fn inline_matches(text: &str) -> Vec<&str> {
    if text.starts_with('/') {
        return Vec::new();
    }

    text.split_whitespace()
        .map(strip_trailing_punctuation)
        .filter(|word| OPERATOR_ENDINGS.iter().any(|op| word.ends_with(op)))
        .filter(|word| word.chars().any(|c| !is_operator_char(c)))
        .collect()
}

/// Increment value of an operator run
pub fn token_increment(mode: &str) -> Result<i64, ParseError> {
    if mode == EM_DASH {
        return Ok(-1);
    }
    if mode == "+-" || mode == "-+" {
        return Ok(0);
    }

    let run = mode.len() as i64;
    if run >= 2 && mode.bytes().all(|b| b == b'+') {
        return Ok(run - 1);
    }
    if run >= 2 && mode.bytes().all(|b| b == b'-') {
        return Ok(-(run - 1));
    }

    Err(ParseError::InvalidMode(mode.to_string()))
}

/// Split one match into its name and increment
fn parse_match(raw: &str) -> Result<(&str, i64), ParseError> {
    let mode = MODE_PATTERN
        .find(raw)
        .ok_or_else(|| ParseError::MissingMode(raw.to_string()))?;

    let name = &raw[..mode.start()];
    if name.is_empty() {
        return Err(ParseError::MissingName(raw.to_string()));
    }

    Ok((name, token_increment(mode.as_str())?))
}

/// Aggregate matches into one token per distinct name, in first-seen order.
pub fn parse_tokens<S: AsRef<str>>(matches: &[S]) -> Result<Vec<Token>, ParseError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for raw in matches {
        let (label, increment) = parse_match(raw.as_ref())?;
        let name = label.to_lowercase();

        match index.get(&name) {
            Some(&i) => tokens[i].increment += increment,
            None => {
                index.insert(name.clone(), tokens.len());
                tokens.push(Token {
                    name,
                    label: label.to_string(),
                    increment,
                });
            }
        }
    }

    Ok(tokens)
}
