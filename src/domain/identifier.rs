//! Fully-qualified node identifiers.
//!
//! An identifier is the only way to address a node inside a structured-data
//! tree. The text form is a `;`-delimited path of field names, where a
//! repeatable field carries its sibling index after `#`:
//!
//! ```text
//! group;multiple-first#1;title
//! ```
//!
//! Parsing happens once; the tree and the schema are both walked with the
//! parsed segment list, never with the raw string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between path segments
pub const DELIMITER: char = ';';

/// Separator between a field name and its sibling index
pub const INDEX_MARKER: char = '#';

/// Identifier parse/build errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Malformed identifier '{input}': {reason}")]
    MalformedIdentifier { input: String, reason: &'static str },
}

impl IdentifierError {
    fn malformed(input: &str, reason: &'static str) -> Self {
        Self::MalformedIdentifier {
            input: input.to_string(),
            reason,
        }
    }
}

/// One step of an identifier path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    name: String,
    index: Option<usize>,
}

impl Segment {
    /// A plain field-name segment
    pub fn field(name: impl Into<String>) -> Result<Self, IdentifierError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name, index: None })
    }

    /// A multiplicity segment (`name#index`)
    pub fn indexed(name: impl Into<String>, index: usize) -> Result<Self, IdentifierError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            index: Some(index),
        })
    }

    /// Segment for a name that is already known to be legal (tree keys)
    pub(crate) fn unchecked(name: &str, index: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Same field, different sibling index
    pub fn with_index(&self, index: usize) -> Self {
        Self {
            name: self.name.clone(),
            index: Some(index),
        }
    }

    fn parse(text: &str, input: &str) -> Result<Self, IdentifierError> {
        if text.is_empty() {
            return Err(IdentifierError::malformed(input, "empty segment"));
        }

        match text.split_once(INDEX_MARKER) {
            None => Ok(Self {
                name: text.to_string(),
                index: None,
            }),
            Some((name, digits)) => {
                if name.is_empty() {
                    return Err(IdentifierError::malformed(input, "empty field name"));
                }
                if digits.is_empty() {
                    return Err(IdentifierError::malformed(input, "missing sibling index"));
                }
                if !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(IdentifierError::malformed(
                        input,
                        "sibling index must be a non-negative integer",
                    ));
                }
                if digits.len() > 1 && digits.starts_with('0') {
                    return Err(IdentifierError::malformed(
                        input,
                        "sibling index has leading zeros",
                    ));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| IdentifierError::malformed(input, "sibling index out of range"))?;
                Ok(Self {
                    name: name.to_string(),
                    index: Some(index),
                })
            }
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}{}{}", self.name, INDEX_MARKER, index),
            None => f.write_str(&self.name),
        }
    }
}

/// Check that a field name can appear in an identifier
pub fn validate_name(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::malformed(name, "empty field name"));
    }
    if name.contains(DELIMITER) || name.contains(INDEX_MARKER) {
        return Err(IdentifierError::malformed(
            name,
            "field name contains a reserved character",
        ));
    }
    Ok(())
}

/// Parsed, fully-qualified node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    segments: Vec<Segment>,
}

impl Identifier {
    /// Parse the `;`-delimited text form
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        if text.is_empty() {
            return Err(IdentifierError::malformed(text, "empty identifier"));
        }

        let segments = text
            .split(DELIMITER)
            .map(|part| Segment::parse(part, text))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    /// Build from already-validated segments. Returns `None` for an empty list.
    pub fn from_segments(segments: Vec<Segment>) -> Option<Self> {
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    /// Single top-level segment
    pub fn root(segment: Segment) -> Self {
        Self {
            segments: vec![segment],
        }
    }

    /// Text form; exact inverse of [`Identifier::parse`]
    pub fn format(&self) -> String {
        self.to_string()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn last(&self) -> &Segment {
        // Non-empty by construction
        &self.segments[self.segments.len() - 1]
    }

    /// Enclosing group's identifier, `None` at the top level
    pub fn parent(&self) -> Option<Self> {
        Self::from_segments(self.segments[..self.segments.len() - 1].to_vec())
    }

    /// Identifier of a child of this node
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Field names with sibling indices stripped, used for schema lookup
    pub fn field_path(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.name.as_str()).collect()
    }

    /// True when both identifiers name the same schema field
    pub fn same_field(&self, other: &Identifier) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.name == b.name)
    }

    /// True when `self` is `other` or lies beneath it
    pub fn starts_with(&self, other: &Identifier) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Replace (or add) the sibling index on the last segment named `field`.
    ///
    /// Returns `None` when no segment has that name.
    pub fn with_sibling_index(&self, field: &str, index: usize) -> Option<Self> {
        let position = self.segments.iter().rposition(|s| s.name == field)?;
        let mut segments = self.segments.clone();
        segments[position] = segments[position].with_index(index);
        Some(Self { segments })
    }

    /// Replace (or add) the sibling index on the final segment
    pub fn with_last_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        let last = segments.len() - 1;
        segments[last] = segments[last].with_index(index);
        Self { segments }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", DELIMITER)?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.to_string()
    }
}
