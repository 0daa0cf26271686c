use std::{fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// A terminology concept identifier.
///
/// Codes are opaque, non-empty strings of ASCII digits (SNOMED CT
/// identifiers, for example `73211009`). They are compared and ordered as
/// strings, which is enough to give exports a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Code(NonEmptyString);

impl Code {
    /// Creates a new `Code` from a string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCodeError`] if the string is empty or contains
    /// characters other than ASCII digits.
    pub fn new(s: String) -> Result<Self, InvalidCodeError> {
        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidCodeError(s));
        }
        let non_empty = NonEmptyString::new(s).map_err(InvalidCodeError)?;
        Ok(Self(non_empty))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Error returned when a string is not a valid code.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid code '{0}': must be non-empty and contain only digits (0-9)")]
pub struct InvalidCodeError(String);

impl TryFrom<String> for Code {
    type Error = InvalidCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Code {
    type Error = InvalidCodeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.as_str().to_owned()
    }
}

impl FromStr for Code {
    type Err = InvalidCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim().to_string())
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Deref for Code {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("73211009"; "snomed concept")]
    #[test_case("0"; "single digit")]
    #[test_case(" 266894000 "; "surrounding whitespace")]
    fn parses_valid_codes(input: &str) {
        let code: Code = input.parse().unwrap();
        assert_eq!(code.as_str(), input.trim());
    }

    #[test_case(""; "empty")]
    #[test_case("12a4"; "letters")]
    #[test_case("-12"; "sign")]
    #[test_case("12 34"; "inner whitespace")]
    fn rejects_invalid_codes(input: &str) {
        assert!(input.parse::<Code>().is_err());
    }

    #[test]
    fn error_message_names_the_input() {
        let error = Code::try_from("abc").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid code 'abc': must be non-empty and contain only digits (0-9)"
        );
    }

    #[test]
    fn serde_round_trips_as_plain_string() {
        let code = Code::try_from("106028002").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"106028002\"");
        let back: Code = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }
}
