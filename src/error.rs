use thiserror::Error;

/// The generic Error type covering every error this library can return.
///
/// The concurrent store itself has no recoverable errors: lookups signal
/// absence through [`Option`] or empty iterators, and misuse of the
/// reader-region protocol is a fatal programming error. The variants below
/// therefore all originate from the query surface, where user-supplied
/// search expressions are parsed and compiled.
#[derive(Error, Debug)]
pub enum Error {
    /// A node or path expression could not be parsed.
    ///
    /// The payload is the remaining, unconsumed portion of the input at the
    /// point where parsing failed.
    #[error("invalid search terms at '{0}'")]
    Parse(String),

    /// A `/.../` pattern inside a node expression is not a valid regular
    /// expression.
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Convenience `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = Error::Parse(":bogus".to_string());
        assert_eq!(err.to_string(), "invalid search terms at ':bogus'");
    }

    #[test]
    fn test_pattern_error_from_regex() {
        let bad = regex::Regex::new("(").unwrap_err();
        let err: Error = bad.into();
        assert!(matches!(err, Error::Pattern(_)));
    }
}
