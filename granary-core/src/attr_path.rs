//! Attribute paths into a nested attribute set.
//!
//! An [`AttrPath`] addresses one node in the attribute tree exposed by a
//! package-set expression. [`AttrPathGlob`] additionally permits a wildcard
//! at the system position, e.g. `packages.*.hello`.

use std::fmt;
use std::slice::Iter;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;

/// An ordered, possibly empty sequence of attribute names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrPath(Vec<String>);

impl AttrPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path such as `legacyPackages.x86_64-linux."foo.bar"`.
    ///
    /// Double quotes delimit components containing `.` or other characters
    /// outside the identifier grammar.
    pub fn parse(raw: &str) -> Self {
        Self(split_dotted(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.0.push(name.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// The path extended by one trailing attribute name.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(name);
        path
    }

    /// The path with its last component removed; `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }
}

impl From<Vec<String>> for AttrPath {
    fn from(parts: Vec<String>) -> Self {
        Self(parts)
    }
}

impl<S: Into<String>> FromIterator<S> for AttrPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, name) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            fmt_component(f, name)?;
        }
        Ok(())
    }
}

/// One element of a globbed path: a concrete name or the system wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobPart {
    Name(String),
    Glob,
}

/// An attribute path whose elements may be the system wildcard `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrPathGlob(Vec<GlobPart>);

impl AttrPathGlob {
    /// Parse a dotted path where a bare `*` component is the wildcard.
    pub fn parse(raw: &str) -> Self {
        Self(
            split_dotted(raw)
                .into_iter()
                .map(|part| {
                    if part == "*" {
                        GlobPart::Glob
                    } else {
                        GlobPart::Name(part)
                    }
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[GlobPart] {
        &self.0
    }

    /// Index of the first wildcard not at the system position, if any.
    pub fn misplaced_glob(&self) -> Option<usize> {
        self.0
            .iter()
            .position(|part| matches!(part, GlobPart::Glob))
            .filter(|&idx| idx != 1)
    }
}

impl From<Vec<GlobPart>> for AttrPathGlob {
    fn from(parts: Vec<GlobPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for AttrPathGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, part) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            match part {
                GlobPart::Name(name) => fmt_component(f, name)?,
                GlobPart::Glob => write!(f, "*")?,
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for AttrPathGlob {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GlobVisitor;

        impl<'de> Visitor<'de> for GlobVisitor {
            type Value = AttrPathGlob;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a dotted attribute path string or an array of names")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(AttrPathGlob::parse(value))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut parts = Vec::new();
                while let Some(part) = seq.next_element::<Option<String>>()? {
                    parts.push(match part {
                        Some(name) => GlobPart::Name(name),
                        None => GlobPart::Glob,
                    });
                }
                Ok(AttrPathGlob(parts))
            }
        }

        deserializer.deserialize_any(GlobVisitor)
    }
}

/// Whether `name` can appear bare in a dotted path.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '-'))
}

fn fmt_component(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_identifier(name) {
        write!(f, "{name}")
    } else {
        write!(f, "\"{name}\"")
    }
}

/// Split a dotted path, honouring double-quoted components.
fn split_dotted(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut seen_any = false;
    for c in raw.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                seen_any = true;
            }
            '.' if !quoted => {
                parts.push(std::mem::take(&mut current));
                seen_any = true;
            }
            _ => {
                current.push(c);
                seen_any = true;
            }
        }
    }
    if seen_any {
        parts.push(current);
    }
    parts
}
