// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! In-memory evaluator mock shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{json, Value};

use granary_core::eval::{Cursor, CursorRef, EvalError};
use granary_core::Fingerprint;
use granary_db::LockedInput;

/// One node of a fake attribute tree.
pub enum Node {
    /// Derivation leaf with its harvestable attributes.
    Drv(BTreeMap<String, Value>),
    /// Attribute set; `recurse` mirrors `recurseForDerivations`.
    Set {
        recurse: Option<bool>,
        children: BTreeMap<String, Rc<Node>>,
    },
    /// A plain value: neither derivation nor attribute set.
    Leaf(Value),
    /// Fails on any evaluator access.
    Broken(String),
}

pub fn drv(name: &str, version: &str) -> Rc<Node> {
    drv_with(name, version, json!({}))
}

/// A derivation named `{name}-{version}` with extra harvestable attributes.
pub fn drv_with(name: &str, version: &str, extra: Value) -> Rc<Node> {
    let mut attrs: BTreeMap<String, Value> = BTreeMap::new();
    attrs.insert("name".into(), json!(format!("{name}-{version}")));
    attrs.insert("pname".into(), json!(name));
    attrs.insert("version".into(), json!(version));
    attrs.insert("system".into(), json!("x86_64-linux"));
    if let Value::Object(obj) = extra {
        for (key, value) in obj {
            attrs.insert(key, value);
        }
    }
    Rc::new(Node::Drv(attrs))
}

fn set_with(recurse: Option<bool>, children: Vec<(&str, Rc<Node>)>) -> Rc<Node> {
    Rc::new(Node::Set {
        recurse,
        children: children
            .into_iter()
            .map(|(name, node)| (name.to_string(), node))
            .collect(),
    })
}

/// An attribute set with no `recurseForDerivations` attribute.
pub fn set(children: Vec<(&str, Rc<Node>)>) -> Rc<Node> {
    set_with(None, children)
}

/// An attribute set declaring `recurseForDerivations = true`.
pub fn recurse_set(children: Vec<(&str, Rc<Node>)>) -> Rc<Node> {
    set_with(Some(true), children)
}

/// An attribute set declaring `recurseForDerivations = false`.
pub fn no_recurse_set(children: Vec<(&str, Rc<Node>)>) -> Rc<Node> {
    set_with(Some(false), children)
}

pub fn leaf(value: Value) -> Rc<Node> {
    Rc::new(Node::Leaf(value))
}

pub fn broken(reason: &str) -> Rc<Node> {
    Rc::new(Node::Broken(reason.to_string()))
}

/// Cursor over a fake attribute tree.
pub struct MemCursor {
    name: String,
    node: Rc<Node>,
}

impl MemCursor {
    pub fn root(node: Rc<Node>) -> CursorRef {
        Rc::new(Self {
            name: String::new(),
            node,
        })
    }
}

impl Cursor for MemCursor {
    fn children(&self) -> Result<Vec<(String, CursorRef)>, EvalError> {
        match &*self.node {
            Node::Set { children, .. } => Ok(children
                .iter()
                .map(|(name, node)| {
                    let cursor: CursorRef = Rc::new(MemCursor {
                        name: name.clone(),
                        node: node.clone(),
                    });
                    (name.clone(), cursor)
                })
                .collect()),
            Node::Drv(_) | Node::Leaf(_) => Ok(Vec::new()),
            Node::Broken(reason) => Err(EvalError::new(&self.name, reason)),
        }
    }

    fn is_derivation(&self) -> Result<bool, EvalError> {
        match &*self.node {
            Node::Drv(_) => Ok(true),
            Node::Broken(reason) => Err(EvalError::new(&self.name, reason)),
            _ => Ok(false),
        }
    }

    fn is_attr_set(&self) -> Result<bool, EvalError> {
        match &*self.node {
            Node::Set { .. } | Node::Drv(_) => Ok(true),
            Node::Broken(reason) => Err(EvalError::new(&self.name, reason)),
            _ => Ok(false),
        }
    }

    fn attr(&self, name: &str) -> Result<Option<Value>, EvalError> {
        match &*self.node {
            Node::Drv(attrs) => Ok(attrs.get(name).cloned()),
            Node::Set { recurse, .. } => Ok(if name == "recurseForDerivations" {
                recurse.map(Value::Bool)
            } else {
                None
            }),
            Node::Leaf(_) => Ok(None),
            Node::Broken(reason) => Err(EvalError::new(&self.name, reason)),
        }
    }
}

/// Locked-input fixture shared by the tests.
pub fn test_input() -> LockedInput {
    let locked_ref = "github:example/flake/0123456789abcdef";
    LockedInput {
        locked_ref: locked_ref.to_string(),
        attrs: json!({
            "type": "github",
            "owner": "example",
            "repo": "flake",
            "rev": "0123456789abcdef"
        }),
        fingerprint: Fingerprint::of(locked_ref),
    }
}
