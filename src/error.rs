use thiserror::Error;

/// Malformed counter token text. Always user-input shaped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unable to find mode in match {0:?}")]
    MissingMode(String),

    #[error("unable to find name in match {0:?}")]
    MissingName(String),

    #[error("unable to get increment value from mode {0:?}")]
    InvalidMode(String),
}

/// The persistent backend could not be reached or an upsert/read failed.
#[derive(Debug, Error)]
#[error("storage error: {context}: {source:#}")]
pub struct StorageError {
    context: String,
    #[source]
    source: anyhow::Error,
}

impl StorageError {
    pub fn new(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Any failure raised while a matcher processes a message.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("matcher panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_messages_quote_input() {
        assert_eq!(
            ParseError::MissingMode("foo".into()).to_string(),
            r#"unable to find mode in match "foo""#
        );
        assert_eq!(
            ParseError::MissingName("++".into()).to_string(),
            r#"unable to find name in match "++""#
        );
        assert_eq!(
            ParseError::InvalidMode("+--".into()).to_string(),
            r#"unable to get increment value from mode "+--""#
        );
    }

    #[test]
    fn test_storage_error_keeps_cause() {
        let err = StorageError::new("increment \"foo\"", anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "storage error: increment \"foo\": disk full");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_storage_error_renders_whole_cause_chain() {
        let cause = anyhow::anyhow!("connection refused").context("Failed to upsert counter");
        let err: MatcherError = StorageError::new("increment \"tea\"", cause).into();
        assert_eq!(
            err.to_string(),
            "storage error: increment \"tea\": Failed to upsert counter: connection refused"
        );
    }

    #[test]
    fn test_matcher_error_is_transparent_for_parse() {
        let err: MatcherError = ParseError::MissingMode("x".into()).into();
        assert_eq!(err.to_string(), r#"unable to find mode in match "x""#);
    }
}
