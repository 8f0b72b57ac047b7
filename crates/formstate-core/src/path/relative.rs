//! Declarative relative paths.
//!
//! Conditions and calculations reference other fields relative to the object
//! that contains them. In schema JSON a relative path is either
//! - a string: a single property name, `..`, or dot-joined tokens such as
//!   `measurements.*.value`
//! - an array of tokens: `["..", "-1", "value"]` (numbers are allowed for
//!   fixed indices)
//!
//! Tokens:
//! - `..`   ascend one level (pop one segment)
//! - `+N`/`-N` offset the index popped by the preceding `..`
//! - `*`    every item index currently present at that position
//! - digits a fixed array index
//! - anything else is a property name

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::path::validate_property_name;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelSegment {
    Name(String),
    Index(usize),
    Parent,
    Offset(i64),
    Wildcard,
}

impl RelSegment {
    pub fn parse(token: &str) -> Result<Self, String> {
        match token {
            "*" => return Ok(RelSegment::Wildcard),
            ".." => return Ok(RelSegment::Parent),
            _ => {}
        }
        if let Some(sign) = token.chars().next().filter(|c| *c == '+' || *c == '-') {
            let digits = &token[1..];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("invalid offset token `{token}`"));
            }
            let n: i64 = digits
                .parse()
                .map_err(|e| format!("offset `{token}`: {e}"))?;
            return Ok(RelSegment::Offset(if sign == '-' { -n } else { n }));
        }
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            return token
                .parse()
                .map(RelSegment::Index)
                .map_err(|e| format!("index `{token}`: {e}"));
        }
        validate_property_name(token)?;
        Ok(RelSegment::Name(token.to_string()))
    }
}

impl fmt::Display for RelSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelSegment::Name(n) => f.write_str(n),
            RelSegment::Index(i) => write!(f, "{i}"),
            RelSegment::Parent => f.write_str(".."),
            RelSegment::Offset(n) if *n >= 0 => write!(f, "+{n}"),
            RelSegment::Offset(n) => write!(f, "{n}"),
            RelSegment::Wildcard => f.write_str("*"),
        }
    }
}

/// A parsed relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativePath(Vec<RelSegment>);

impl RelativePath {
    pub fn new(segments: Vec<RelSegment>) -> Self {
        Self(segments)
    }

    /// Parse the string form (`name`, `..`, or dot-joined tokens).
    pub fn parse(s: &str) -> Result<Self, String> {
        if s == ".." {
            return Ok(Self(vec![RelSegment::Parent]));
        }
        let segs = s
            .split('.')
            .map(RelSegment::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segs))
    }

    pub fn segments(&self) -> &[RelSegment] {
        &self.0
    }

    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(|s| matches!(s, RelSegment::Wildcard))
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawToken {
    Text(String),
    Number(u64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPath {
    Text(String),
    Tokens(Vec<RawToken>),
}

impl<'de> Deserialize<'de> for RelativePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawPath::deserialize(deserializer)? {
            RawPath::Text(s) => RelativePath::parse(&s).map_err(de::Error::custom),
            RawPath::Tokens(tokens) => {
                if tokens.is_empty() {
                    return Err(de::Error::custom("relative path must not be empty"));
                }
                let segs = tokens
                    .into_iter()
                    .map(|t| match t {
                        RawToken::Text(s) => RelSegment::parse(&s),
                        RawToken::Number(n) => Ok(RelSegment::Index(n as usize)),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(de::Error::custom)?;
                Ok(RelativePath(segs))
            }
        }
    }
}

impl Serialize for RelativePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tokens: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        tokens.serialize(serializer)
    }
}
