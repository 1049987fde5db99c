//! Tag-function registry
//!
//! The engine ships no tags of its own: the host registers every callable
//! here, keyed by camelCase name. A tag with no registry entry is inert and
//! survives rendering untouched.

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::{Node, Params};
use crate::evaluate::EvalMeta;
use crate::expr::ExprError;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("{0}")]
    Failed(String),
    #[error("Missing required parameter: {0}")]
    MissingParam(&'static str),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// When a tag function runs relative to the tag's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalOrder {
    /// Run before the children (breadth-first). The function sees the
    /// children's source text, and its output replaces them unevaluated.
    Before,
    /// Run after the children (depth-first, the default). The function sees
    /// the children's rendered output.
    #[default]
    After,
}

/// What a tag function produced.
#[derive(Debug)]
pub enum TagOutput {
    /// Replacement text. Consumes a single tag; becomes a double tag's
    /// only child.
    Text(String),
    /// A rewritten copy of the tag itself. Applied only when it keeps the
    /// same kind, name and index as the evaluated tag.
    Node(Node),
}

impl TagOutput {
    pub fn text(t: impl Into<String>) -> Option<TagOutput> {
        Some(TagOutput::Text(t.into()))
    }
}

/// A tag callable: `(zero_param_text, local_params, meta)`.
/// `Ok(None)` leaves the tag untouched.
pub type TagFn = Box<dyn Fn(&str, &Params, &mut EvalMeta) -> Result<Option<TagOutput>, TagError>>;

/// A registry entry: a bare function, or a function wrapped with options.
pub enum TagEntry {
    Plain(TagFn),
    Wrapped {
        func: TagFn,
        eval_order: EvalOrder,
        description: Option<String>,
    },
}

impl TagEntry {
    pub fn func(&self) -> &TagFn {
        match self {
            TagEntry::Plain(func) => func,
            TagEntry::Wrapped { func, .. } => func,
        }
    }

    pub fn eval_order(&self) -> EvalOrder {
        match self {
            TagEntry::Plain(_) => EvalOrder::default(),
            TagEntry::Wrapped { eval_order, .. } => *eval_order,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TagEntry::Plain(_) => None,
            TagEntry::Wrapped { description, .. } => description.as_deref(),
        }
    }
}

/// All the tag functions known to one render pass.
#[derive(Default)]
pub struct Registry {
    tags: HashMap<String, TagEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a tag function with the default (depth-first) eval order.
    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&str, &Params, &mut EvalMeta) -> Result<Option<TagOutput>, TagError> + 'static,
    {
        self.tags
            .insert(name.to_string(), TagEntry::Plain(Box::new(func)));
    }

    /// Register a tag function that runs before its children.
    pub fn register_before<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&str, &Params, &mut EvalMeta) -> Result<Option<TagOutput>, TagError> + 'static,
    {
        self.tags.insert(
            name.to_string(),
            TagEntry::Wrapped {
                func: Box::new(func),
                eval_order: EvalOrder::Before,
                description: None,
            },
        );
    }

    /// Register a wrapped entry with an explicit order and description.
    pub fn register_wrapped<F>(
        &mut self,
        name: &str,
        func: F,
        eval_order: EvalOrder,
        description: impl Into<String>,
    ) where
        F: Fn(&str, &Params, &mut EvalMeta) -> Result<Option<TagOutput>, TagError> + 'static,
    {
        self.tags.insert(
            name.to_string(),
            TagEntry::Wrapped {
                func: Box::new(func),
                eval_order,
                description: Some(description.into()),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&TagEntry> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
