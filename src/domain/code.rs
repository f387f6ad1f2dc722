//! Practice code value object
//!
//! A `Code` is the unit of work: one search key submitted to the portal.
//! It is always trimmed and never empty.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    #[error("Code is empty after trimming")]
    Empty,
}

/// Trimmed, non-empty search key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Code(String);

impl Code {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, CodeError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CodeError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Parses a list, silently dropping blank entries while keeping order
    pub fn parse_all<I, S>(raw: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().filter_map(|s| Self::new(s).ok()).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Code {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("  ABC123 ", "ABC123")]
    #[case("X", "X")]
    #[case("\tNSIS-001\n", "NSIS-001")]
    fn test_code_is_trimmed(#[case] raw: &str, #[case] expected: &str) {
        let code = Code::new(raw).unwrap();
        assert_eq!(code.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\n\t")]
    fn test_blank_code_rejected(#[case] raw: &str) {
        assert_eq!(Code::new(raw), Err(CodeError::Empty));
    }

    #[test]
    fn test_parse_all_keeps_order_and_skips_blanks() {
        let codes = Code::parse_all(["B", " ", "A", "", " C "]);
        let values: Vec<&str> = codes.iter().map(Code::as_str).collect();
        assert_eq!(values, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_serde_rejects_blank() {
        assert!(serde_json::from_str::<Code>("\"  \"").is_err());
        let code: Code = serde_json::from_str("\" Q1 \"").unwrap();
        assert_eq!(code.as_str(), "Q1");
    }
}
