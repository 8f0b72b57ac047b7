//! Structured field addresses.
//!
//! Every input of a rendered form is addressed by a [`FieldPath`]: an ordered
//! list of property-name and array-index segments. Internally all logic works
//! on this type; the underscore-joined identifier form
//! (`<root>__<segment>(__<segment>)*`) only exists at the boundary through the
//! [`FieldPath::to_identifier`] / [`FieldPath::parse_identifier`] pair.
//!
//! Submodules:
//! - `relative`: declarative relative paths used by conditions and calculations
//! - `resolve`: resolution of relative paths against the rendered tree

use std::fmt;

use crate::errors::{FormError, FormResult};

pub mod relative;
pub mod resolve;

pub use relative::{RelSegment, RelativePath};
pub use resolve::{resolve, FieldIndex, Resolution};

/// Separator between identifier segments.
pub const SEGMENT_SEPARATOR: &str = "__";

/// One step of a field path.
///
/// Ordering places names before indices and compares indices numerically, so a
/// `BTreeMap<FieldPath, _>` iterates array items in index order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Name(String),
    Index(usize),
}

impl Segment {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Name(_) => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(n) => f.write_str(n),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Absolute address of a node in the rendered form tree.
///
/// The empty path is the root object.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Name of the last segment when it is a property name.
    pub fn property_name(&self) -> Option<&str> {
        match self.0.last() {
            Some(Segment::Name(n)) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut p = self.clone();
        p.0.push(Segment::Name(name.into()));
        p
    }

    pub fn item(&self, index: usize) -> Self {
        let mut p = self.clone();
        p.0.push(Segment::Index(index));
        p
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// True if `prefix` addresses this node or one of its ancestors.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Replace the index segment at `pos` (used by renumbering).
    ///
    /// Returns `None` if `pos` is out of range or not an index segment.
    pub fn with_index_at(&self, pos: usize, index: usize) -> Option<Self> {
        match self.0.get(pos) {
            Some(Segment::Index(_)) => {
                let mut segs = self.0.clone();
                segs[pos] = Segment::Index(index);
                Some(Self(segs))
            }
            _ => None,
        }
    }

    /// Move this path from under `from` to under `to`.
    ///
    /// Returns `None` if this path is not at or below `from`.
    pub fn rebase(&self, from: &FieldPath, to: &FieldPath) -> Option<Self> {
        if !self.starts_with(from) {
            return None;
        }
        let mut segs = to.0.clone();
        segs.extend_from_slice(&self.0[from.len()..]);
        Some(Self(segs))
    }

    /// Render the external identifier, e.g. `object__rows__2__value`.
    pub fn to_identifier(&self, root: &str) -> String {
        let mut out = String::from(root);
        for seg in &self.0 {
            out.push_str(SEGMENT_SEPARATOR);
            out.push_str(&seg.to_string());
        }
        out
    }

    /// Parse an external identifier produced by [`FieldPath::to_identifier`].
    pub fn parse_identifier(root: &str, id: &str) -> FormResult<Self> {
        let rest = id
            .strip_prefix(root)
            .ok_or_else(|| FormError::identifier(id, format!("missing root prefix `{root}`")))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let rest = rest
            .strip_prefix(SEGMENT_SEPARATOR)
            .ok_or_else(|| FormError::identifier(id, "root prefix not followed by `__`"))?;

        let mut segments = Vec::new();
        for raw in rest.split(SEGMENT_SEPARATOR) {
            segments.push(parse_segment(raw).map_err(|reason| FormError::identifier(id, reason))?);
        }
        Ok(Self(segments))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

fn parse_segment(raw: &str) -> Result<Segment, String> {
    if raw.is_empty() {
        return Err("empty segment".to_string());
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        if raw.len() > 1 && raw.starts_with('0') {
            return Err(format!("index `{raw}` has a leading zero"));
        }
        return raw
            .parse::<usize>()
            .map(Segment::Index)
            .map_err(|e| format!("index `{raw}`: {e}"));
    }
    validate_property_name(raw)?;
    Ok(Segment::Name(raw.to_string()))
}

/// Property names must survive the identifier round trip unambiguously.
///
/// Rules: non-empty, ASCII alphanumerics and `_`, not purely numeric, no `__`,
/// and no leading or trailing `_`.
pub fn validate_property_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty property name".to_string());
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(format!("property name `{name}` contains invalid characters"));
    }
    if name.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("property name `{name}` is numeric"));
    }
    if name.contains(SEGMENT_SEPARATOR) || name.starts_with('_') || name.ends_with('_') {
        return Err(format!("property name `{name}` clashes with the `__` separator"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(segs: &[&str]) -> FieldPath {
        FieldPath::from_segments(
            segs.iter()
                .map(|s| match s.parse::<usize>() {
                    Ok(i) => Segment::Index(i),
                    Err(_) => Segment::Name(s.to_string()),
                })
                .collect(),
        )
    }

    #[test]
    fn identifier_round_trip() {
        let path = p(&["measurements", "2", "value"]);
        let id = path.to_identifier("object");
        assert_eq!(id, "object__measurements__2__value");
        assert_eq!(FieldPath::parse_identifier("object", &id).unwrap(), path);
    }

    #[test]
    fn root_identifier_is_bare_prefix() {
        assert_eq!(FieldPath::root().to_identifier("object"), "object");
        assert!(FieldPath::parse_identifier("object", "object").unwrap().is_empty());
    }

    #[test]
    fn malformed_identifiers_rejected() {
        assert!(FieldPath::parse_identifier("object", "other__a").is_err());
        assert!(FieldPath::parse_identifier("object", "object_a").is_err());
        assert!(FieldPath::parse_identifier("object", "object__a____b").is_err());
        assert!(FieldPath::parse_identifier("object", "object__rows__01").is_err());
    }

    #[test]
    fn underscores_inside_names_survive() {
        let path = p(&["sample_mass", "0", "unit_cost"]);
        let id = path.to_identifier("object");
        assert_eq!(FieldPath::parse_identifier("object", &id).unwrap(), path);
    }

    #[test]
    fn indices_sort_numerically() {
        let mut v = vec![p(&["rows", "10"]), p(&["rows", "2"]), p(&["rows", "0"])];
        v.sort();
        assert_eq!(v, vec![p(&["rows", "0"]), p(&["rows", "2"]), p(&["rows", "10"])]);
    }

    #[test]
    fn with_index_at_only_touches_indices() {
        let path = p(&["rows", "3", "value"]);
        assert_eq!(path.with_index_at(1, 0).unwrap(), p(&["rows", "0", "value"]));
        assert!(path.with_index_at(0, 0).is_none());
    }
}
