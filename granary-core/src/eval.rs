//! The evaluator capability and package-field harvesting.
//!
//! The scrape engine never talks to an evaluator directly; it sees the lazy
//! attribute tree through [`Cursor`] handles supplied by the collaborator.
//! Any accessor may force evaluation and fail.

use std::rc::Rc;

use semver::Version;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Failure reported by the evaluator while forcing an attribute.
///
/// Carried through unchanged; the scrape engine logs and skips the affected
/// child rather than aborting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("evaluation of '{attr}' failed: {reason}")]
pub struct EvalError {
    pub attr: String,
    pub reason: String,
}

impl EvalError {
    pub fn new(attr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            reason: reason.into(),
        }
    }
}

/// A handle into the lazily evaluated attribute tree.
///
/// Cursors make no thread-safety promises beyond what the evaluator
/// documents; the engine holds them on a single thread.
pub trait Cursor {
    /// Enumerate direct children as `(name, cursor)` pairs.
    ///
    /// Ordering is evaluator-defined and must not be relied upon.
    fn children(&self) -> Result<Vec<(String, CursorRef)>, EvalError>;

    /// Whether this node is a derivation.
    fn is_derivation(&self) -> Result<bool, EvalError>;

    /// Whether this node is an attribute set. Derivations are attribute
    /// sets too; callers check [`Cursor::is_derivation`] first.
    fn is_attr_set(&self) -> Result<bool, EvalError>;

    /// Force a direct attribute of this node into a JSON value.
    ///
    /// `Ok(None)` when the attribute is missing.
    fn attr(&self, name: &str) -> Result<Option<Value>, EvalError>;
}

pub type CursorRef = Rc<dyn Cursor>;

/// Harvested package fields, normalised to database column types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMeta {
    pub name: String,
    pub pname: Option<String>,
    pub version: Option<String>,
    pub semver: Option<String>,
    /// SPDX identifiers where available.
    pub license: Option<Vec<String>>,
    pub broken: Option<bool>,
    pub unfree: Option<bool>,
    pub description: Option<String>,
    pub outputs: Vec<String>,
    pub outputs_to_install: Vec<String>,
    pub system: Option<String>,
    /// `file:line` of the defining expression, if known.
    pub position: Option<String>,
}

impl PackageMeta {
    /// Extract the harvested fields from a derivation cursor.
    ///
    /// Values of unexpected types are logged and stored as null rather than
    /// failing the package.
    pub fn harvest(attr_name: &str, cursor: &dyn Cursor) -> Result<Self, EvalError> {
        let name = match cursor.attr("name")? {
            Some(Value::String(s)) => s,
            Some(other) => {
                warn_type(attr_name, "name", &other);
                attr_name.to_string()
            }
            None => attr_name.to_string(),
        };

        let version = opt_string(attr_name, cursor, "version")?;
        let semver = version.as_deref().and_then(derive_semver);

        let outputs = match cursor.attr("outputs")? {
            Some(value) => string_list(attr_name, "outputs", &value)
                .unwrap_or_else(|| vec!["out".to_string()]),
            None => vec!["out".to_string()],
        };
        let outputs_to_install = match cursor.attr("outputsToInstall")? {
            Some(value) => {
                string_list(attr_name, "outputsToInstall", &value).unwrap_or_else(|| outputs.clone())
            }
            None => outputs.clone(),
        };

        let license = match cursor.attr("license")? {
            Some(value) => normalize_license(attr_name, &value),
            None => None,
        };

        Ok(Self {
            name,
            pname: opt_string(attr_name, cursor, "pname")?,
            version,
            semver,
            license,
            broken: opt_bool(attr_name, cursor, "broken")?,
            unfree: opt_bool(attr_name, cursor, "unfree")?,
            description: opt_string(attr_name, cursor, "description")?,
            outputs,
            outputs_to_install,
            system: opt_string(attr_name, cursor, "system")?,
            position: opt_string(attr_name, cursor, "position")?,
        })
    }
}

fn warn_type(attr_name: &str, field: &str, value: &Value) {
    warn!(
        attr = attr_name,
        field,
        found = value_kind(value),
        "unexpected type for harvested field, storing null"
    );
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn opt_string(
    attr_name: &str,
    cursor: &dyn Cursor,
    field: &str,
) -> Result<Option<String>, EvalError> {
    Ok(match cursor.attr(field)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => {
            warn_type(attr_name, field, &other);
            None
        }
    })
}

fn opt_bool(
    attr_name: &str,
    cursor: &dyn Cursor,
    field: &str,
) -> Result<Option<bool>, EvalError> {
    Ok(match cursor.attr(field)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Null) | None => None,
        Some(other) => {
            warn_type(attr_name, field, &other);
            None
        }
    })
}

fn string_list(attr_name: &str, field: &str, value: &Value) -> Option<Vec<String>> {
    let Value::Array(elements) = value else {
        warn_type(attr_name, field, value);
        return None;
    };
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Value::String(s) => out.push(s.clone()),
            other => {
                warn_type(attr_name, field, other);
                return None;
            }
        }
    }
    Some(out)
}

/// Flatten the evaluator's license forms into SPDX identifier strings.
///
/// Accepts a bare string, an attrset carrying `spdxId`, or a list of either.
fn normalize_license(attr_name: &str, value: &Value) -> Option<Vec<String>> {
    fn single(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => match obj.get("spdxId") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    let ids: Vec<String> = match value {
        Value::Array(elements) => elements.iter().filter_map(single).collect(),
        other => single(other).into_iter().collect(),
    };
    if ids.is_empty() {
        warn_type(attr_name, "license", value);
        return None;
    }
    Some(ids)
}

/// Derive a normalised semantic version from a raw version string.
///
/// A leading `v` is tolerated; anything else unparseable yields `None`.
fn derive_semver(version: &str) -> Option<String> {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    Version::parse(trimmed).ok().map(|v| v.to_string())
}
