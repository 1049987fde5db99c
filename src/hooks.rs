//! Hook middleware
//!
//! Addons intercept tag evaluation at three points: before the tag function
//! runs, after it ran, and before the children are walked. Each hook returns
//! a [`HookFlow`] telling the evaluator what to do next. Registration is
//! explicit: a [`HookRegistry`] is a plain value owned by the caller, and
//! hooks run in registration order.

use serde_json::Value as JsonValue;

use crate::ast::{Node, Params};
use crate::evaluate::EvalMeta;

/// What the evaluator does after a hook returns.
pub enum HookFlow {
    /// Keep going: the next hook, then the tag function.
    Continue,
    /// Use this value as the tag's result. The tag function, the remaining
    /// hooks in this list, and the rest of this tag's evaluation are skipped.
    /// Honored by pre-eval and post-eval hooks.
    Return(JsonValue),
    /// Leave the children unevaluated. Honored by pre-children hooks only.
    SkipChildren,
    /// Abandon this tag entirely, with a logged warning.
    Abort(String),
}

/// Runs before the tag function: `(tag, local_ctx, global_ctx, meta)`.
pub type PreEvalHook = Box<dyn Fn(&Node, &Params, &mut Params, &mut EvalMeta) -> HookFlow>;

/// Runs after the tag function: `(result, tag, local_ctx, global_ctx, meta)`.
/// `result` is the value the tag function produced, if any.
pub type PostEvalHook =
    Box<dyn Fn(Option<&JsonValue>, &Node, &Params, &mut Params, &mut EvalMeta) -> HookFlow>;

/// Runs before the children are walked: `(tag, local_ctx, global_ctx, meta)`.
pub type PreChildrenHook = Box<dyn Fn(&Node, &Params, &mut Params, &mut EvalMeta) -> HookFlow>;

/// An addon is a named bundle of optional hooks.
pub struct Addon {
    pub name: &'static str,
    pub pre_eval: Option<PreEvalHook>,
    pub post_eval: Option<PostEvalHook>,
    pub pre_children: Option<PreChildrenHook>,
}

impl Addon {
    pub fn named(name: &'static str) -> Self {
        Addon {
            name,
            pre_eval: None,
            post_eval: None,
            pre_children: None,
        }
    }
}

/// The three ordered hook lists. Order is registration order, and it
/// matters: an earlier hook can short-circuit the later ones.
#[derive(Default)]
pub struct HookRegistry {
    pre_eval: Vec<(&'static str, PreEvalHook)>,
    post_eval: Vec<(&'static str, PostEvalHook)>,
    pre_children: Vec<(&'static str, PreChildrenHook)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    pub fn register(&mut self, addon: Addon) {
        if let Some(h) = addon.pre_eval {
            self.pre_eval.push((addon.name, h));
        }
        if let Some(h) = addon.post_eval {
            self.post_eval.push((addon.name, h));
        }
        if let Some(h) = addon.pre_children {
            self.pre_children.push((addon.name, h));
        }
    }

    pub fn pre_eval(&self) -> impl Iterator<Item = &(&'static str, PreEvalHook)> {
        self.pre_eval.iter()
    }

    pub fn post_eval(&self) -> impl Iterator<Item = &(&'static str, PostEvalHook)> {
        self.post_eval.iter()
    }

    pub fn pre_children(&self) -> impl Iterator<Item = &(&'static str, PreChildrenHook)> {
        self.pre_children.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.pre_eval.is_empty() && self.post_eval.is_empty() && self.pre_children.is_empty()
    }
}

/// JSON truthiness, the way parameter flags like `freeze=true` or `cut=1`
/// are checked.
pub fn truthy(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(_)) | Some(JsonValue::Object(_)) => true,
    }
}
