//  IDENTIFIER.rs
//    by Lut99
//
//  Created:
//    16 Jan 2025, 14:11:02
//  Last edited:
//    04 May 2026, 14:31:48
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines a validated name for task queues and handler types. Only
//!   alphanumerical characters, underscores and dashes are allowed, which
//!   keeps the names safely embeddable in headers and wire options.
//

use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FResult};
use std::ops::Deref;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_test::{Token, assert_de_tokens_error, assert_tokens};

    use super::*;


    #[test]
    fn test_identifier_parse() {
        assert!(Identifier::from_str("default").is_ok());
        assert!(Identifier::from_str("task_queue-2").is_ok());
        assert!(matches!(Identifier::from_str("task queue"), Err(IdentifierParseError::IllegalChar { c: ' ', .. })));
        assert!(matches!(Identifier::from_str(""), Err(IdentifierParseError::Empty)));
    }

    #[test]
    fn test_identifier_serde() {
        let id: Identifier = Identifier::from_str("default").unwrap();
        assert_tokens(&id, &[Token::Str("default")]);
        assert_de_tokens_error::<Identifier>(&[Token::Str("not ok")], "Identifier 'not ok' cannot contain character ' ', only alphanumerical characters, underscores and dashes\n");
    }
}





/***** ERRORS *****/
/// Defines the errors that may occur when parsing [`Identifier`]s.
#[derive(Debug)]
pub enum IdentifierParseError {
    /// The identifier was empty.
    Empty,
    /// The identifier had an illegal character.
    IllegalChar { raw: String, c: char },
}
impl Display for IdentifierParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use IdentifierParseError::*;
        match self {
            Empty => writeln!(f, "Identifier cannot be empty"),
            IllegalChar { raw, c } => {
                writeln!(f, "Identifier '{raw}' cannot contain character '{c}', only alphanumerical characters, underscores and dashes")
            },
        }
    }
}
impl Error for IdentifierParseError {}





/***** LIBRARY *****/
/// Defines an owned [`String`] that only contains alphanumerical characters, underscores and
/// dashes.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Identifier(String);
impl Identifier {
    /// Helper function that checks if a string is valid according to the identifier.
    ///
    /// # Returns
    /// [`None`] if it is, or [`Some`] and the character that was illegal.
    #[inline]
    fn is_valid(s: &str) -> Option<char> { s.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-') }
}

impl Debug for Identifier {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "Identifier({:?})", self.0) }
}
impl Display for Identifier {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "{}", self.0) }
}
impl FromStr for Identifier {
    type Err = IdentifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentifierParseError::Empty);
        }
        if let Some(c) = Self::is_valid(s) {
            return Err(IdentifierParseError::IllegalChar { raw: s.into(), c });
        }
        Ok(Self(s.into()))
    }
}
impl TryFrom<&str> for Identifier {
    type Error = IdentifierParseError;

    #[inline]
    fn try_from(value: &str) -> Result<Self, Self::Error> { Self::from_str(value) }
}
impl TryFrom<String> for Identifier {
    type Error = IdentifierParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::from_str(&value) }
}
impl Serialize for Identifier {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}
impl<'de> Deserialize<'de> for Identifier {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// The Visitor for the [`Identifier`].
        struct IdentifierVisitor;
        impl<'de> Visitor<'de> for IdentifierVisitor {
            type Value = Identifier;

            fn expecting(&self, f: &mut Formatter) -> FResult { write!(f, "an identifier") }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                // Simply forward to [`Identifier::from_str()`]
                match Identifier::from_str(v) {
                    Ok(value) => Ok(value),
                    Err(err) => Err(E::custom(err)),
                }
            }
        }

        // Visit the visitor
        deserializer.deserialize_str(IdentifierVisitor)
    }
}

impl Deref for Identifier {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target { &self.0 }
}
impl AsRef<str> for Identifier {
    #[inline]
    fn as_ref(&self) -> &str { &self.0 }
}
impl From<Identifier> for String {
    #[inline]
    fn from(value: Identifier) -> Self { value.0 }
}
impl From<&Identifier> for String {
    #[inline]
    fn from(value: &Identifier) -> Self { value.0.clone() }
}
