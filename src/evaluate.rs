//! The tag evaluator
//!
//! Walks a parsed forest and applies the registered tag functions, threading
//! the hook middleware around every call. Evaluation never fails: a tag
//! function error, a hook abort or a failed interpolation logs a warning and
//! leaves the tag as it was, so the surrounding document always survives.
//!
//! Per tag, the order is:
//!
//! 1. build the local context (global context + params, interpolated);
//! 2. if the tag's eval order is `Before`: pre-eval hooks, the tag function,
//!    post-eval hooks;
//! 3. pre-children hooks, then each child in a deep-cloned context scope;
//! 4. if the eval order is `After` (the default): pre-eval hooks, the tag
//!    function, post-eval hooks.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as JsonValue;

use crate::ast::{consume_tag, get_text, Node, Params, ParentRef};
use crate::cache::MemoCache;
use crate::config::Config;
use crate::expr::{interpolate, should_interpolate, value_to_text, ExprHost, SimpleExpr};
use crate::hooks::{truthy, HookFlow, HookRegistry};
use crate::registry::{EvalOrder, Registry, TagEntry, TagOutput};

/// Ambient data handed to tag functions and hooks.
pub struct EvalMeta {
    /// Directory of the source file, or empty for in-memory text
    pub root: String,
    /// Source file name, or empty
    pub fname: String,
    pub config: Config,
    /// A snapshot of the tag under evaluation, parent reference included
    pub node: Node,
    /// The per-pass cache, shared across the whole render
    pub cache: Rc<RefCell<MemoCache>>,
}

/// One evaluation pass over a forest.
pub struct Evaluator<'a> {
    pub registry: &'a Registry,
    pub hooks: &'a HookRegistry,
    pub cfg: Config,
    pub host: &'a dyn ExprHost,
    pub cache: Rc<RefCell<MemoCache>>,
    pub root: String,
    pub fname: String,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a Registry, hooks: &'a HookRegistry, cfg: Config) -> Self {
        Evaluator {
            registry,
            hooks,
            cfg,
            host: &SimpleExpr,
            cache: Rc::new(RefCell::new(MemoCache::new())),
            root: String::new(),
            fname: String::new(),
        }
    }

    /// Evaluate every tag in the forest against a shared global context.
    pub fn evaluate_all(&self, nodes: &mut [Node], global: &mut Params) {
        for node in nodes {
            self.evaluate(node, global);
        }
    }

    /// Evaluate one node, recursively.
    pub fn evaluate(&self, node: &mut Node, global: &mut Params) {
        if node.name.is_none() {
            return;
        }

        let entry = node
            .name
            .as_ref()
            .and_then(|name| self.registry.get(name));
        let eval_order = entry.map(TagEntry::eval_order).unwrap_or_default();

        let local = self.build_local_ctx(node, global);

        if eval_order == EvalOrder::Before {
            if let Some(entry) = entry {
                if !self.apply_tag(node, &local, global, entry) {
                    return;
                }
            }
        }

        // Deep evaluate all children, including unknown tags
        if node.children.is_some() {
            let mut walk_children = true;
            let mut meta = self.prepare_meta(node);
            for (name, hook) in self.hooks.pre_children() {
                match hook(node, &local, global, &mut meta) {
                    HookFlow::Continue | HookFlow::Return(_) => {}
                    HookFlow::SkipChildren => walk_children = false,
                    HookFlow::Abort(msg) => {
                        log::warn!("Hook {name} aborted before children of {:?}: {msg}", node.name);
                        return;
                    }
                }
            }
            if walk_children {
                let parent = ParentRef {
                    name: node.name.clone(),
                    index: node.index,
                    single: node.single,
                    double: node.double,
                    params: node.params.clone(),
                };
                // A deep copy of the context: a separate variable scope,
                // so the children cannot leak into their siblings' parents
                let mut child_ctx = global.clone();
                if let Some(children) = node.children.as_mut() {
                    for child in children {
                        if child.name.is_some() && (child.single || child.double) {
                            child.parent = Some(parent.clone());
                        }
                        self.evaluate(child, &mut child_ctx);
                    }
                }
            }
        }

        if eval_order == EvalOrder::After {
            if let Some(entry) = entry {
                self.apply_tag(node, &local, global, entry);
            }
        }
    }

    /// Local context: global context, overlaid with the tag's params, with
    /// interpolation candidates resolved against both.
    fn build_local_ctx(&self, node: &Node, global: &Params) -> Params {
        let mut local = global.clone();
        if let Some(params) = &node.params {
            for (k, v) in params {
                local.insert(k.clone(), v.clone());
            }
        }

        let (Some(params), Some(raw_params)) = (&node.params, &node.raw_params) else {
            return local;
        };
        for (key, raw) in raw_params {
            if !should_interpolate(raw, &self.cfg) {
                continue;
            }
            // Expressions see params overlaid by the global context,
            // and never the zero param
            let mut expr_ctx = params.clone();
            for (k, v) in global {
                expr_ctx.insert(k.clone(), v.clone());
            }
            expr_ctx.remove("0");

            match interpolate(raw, &expr_ctx, &self.cfg, self.host) {
                Ok(value) => {
                    if key == "0" {
                        if let JsonValue::Object(spread) = value {
                            // The zero param was a spread, e.g. {...props}
                            local.remove("0");
                            for (k, v) in spread {
                                local.insert(k, v);
                            }
                        } else {
                            local.insert("0".to_string(), value);
                        }
                    } else {
                        local.insert(key.clone(), value);
                    }
                }
                Err(err) => {
                    log::warn!("Cannot interpolate {key}={raw}: {err}");
                }
            }
        }
        local
    }

    fn prepare_meta(&self, node: &Node) -> EvalMeta {
        let mut snapshot = node.clone();
        if snapshot.params.is_none() {
            snapshot.params = Some(Params::new());
        }
        EvalMeta {
            root: self.root.clone(),
            fname: self.fname.clone(),
            config: self.cfg,
            node: snapshot,
            cache: Rc::clone(&self.cache),
        }
    }

    /// Run the hook sandwich and the tag function itself.
    /// Returns false when the rest of this tag's evaluation must stop.
    fn apply_tag(
        &self,
        node: &mut Node,
        local: &Params,
        global: &mut Params,
        entry: &TagEntry,
    ) -> bool {
        let mut meta = self.prepare_meta(node);

        for (name, hook) in self.hooks.pre_eval() {
            match hook(node, local, global, &mut meta) {
                HookFlow::Continue | HookFlow::SkipChildren => {}
                HookFlow::Return(value) => {
                    log::info!("Hook {name} replaced tag {:?}", node.name);
                    apply_replacement(node, &value);
                    return false;
                }
                HookFlow::Abort(msg) => {
                    log::warn!("Hook {name} aborted tag {:?}: {msg}", node.name);
                    return false;
                }
            }
        }

        let result = if node.is_double() {
            self.eval_double(node, local, entry, &mut meta)
        } else if node.is_single() {
            self.eval_single(node, local, entry, &mut meta)
        } else {
            None
        };

        for (name, hook) in self.hooks.post_eval() {
            match hook(result.as_ref(), node, local, global, &mut meta) {
                HookFlow::Continue | HookFlow::SkipChildren => {}
                HookFlow::Return(value) => {
                    log::info!("Hook {name} replaced result of tag {:?}", node.name);
                    apply_replacement(node, &value);
                    return false;
                }
                HookFlow::Abort(msg) => {
                    log::warn!("Hook {name} aborted tag {:?}: {msg}", node.name);
                    return false;
                }
            }
        }

        // cut=true destroys the tag, keeping only its final text
        if truthy(local.get("cut")) {
            if node.is_double() {
                node.raw_text = match &result {
                    Some(value) => value_to_text(value),
                    None => get_text(node),
                };
            }
            consume_tag(node);
        }
        true
    }

    /// A single tag receives its zero param as input text. Any text result
    /// replaces the whole tag and consumes it.
    fn eval_single(
        &self,
        node: &mut Node,
        local: &Params,
        entry: &TagEntry,
        meta: &mut EvalMeta,
    ) -> Option<JsonValue> {
        let first = local.get("0").map(value_to_text).unwrap_or_default();

        match (entry.func())(&first, local, meta) {
            Err(err) => {
                log::warn!("Cannot evaluate single tag {:?}: {err}", node.name);
                None
            }
            Ok(None) => None,
            Ok(Some(TagOutput::Text(text))) => {
                node.raw_text = text.clone();
                consume_tag(node);
                Some(JsonValue::String(text))
            }
            Ok(Some(TagOutput::Node(out))) => {
                // A self-rewrite is applied only when the returned node is
                // recognizably the same tag
                if out.single && out.name == node.name && out.index == node.index {
                    node.raw_text = out.raw_text;
                    node.params = out.params;
                    node.raw_params = out.raw_params;
                    consume_tag(node);
                } else {
                    log::warn!("Discarding foreign node from single tag {:?}", node.name);
                }
                None
            }
        }
    }

    /// A double tag receives the flattened text of its children. Any text
    /// result replaces the children; the tag itself survives.
    fn eval_double(
        &self,
        node: &mut Node,
        local: &Params,
        entry: &TagEntry,
        meta: &mut EvalMeta,
    ) -> Option<JsonValue> {
        let inner_text = get_text(node);
        let zero = local.get("0").map(value_to_text).unwrap_or_default();
        let first = if zero.is_empty() { inner_text.clone() } else { zero };

        let mut call_ctx = local.clone();
        call_ctx.insert("innerText".to_string(), inner_text.clone().into());

        match (entry.func())(&first, &call_ctx, meta) {
            Err(err) => {
                log::warn!(
                    "Cannot evaluate double tag {:?}...{:?}: {err}",
                    node.first_tag_text,
                    node.second_tag_text
                );
                None
            }
            Ok(None) => None,
            Ok(Some(TagOutput::Text(text))) => {
                // All children are flattened into the result
                node.children = Some(vec![Node::raw(node.index, text.clone())]);
                Some(JsonValue::String(text))
            }
            Ok(Some(TagOutput::Node(out))) => {
                if out.double && out.name == node.name && out.index == node.index {
                    if out.first_tag_text.is_some() {
                        node.first_tag_text = out.first_tag_text;
                    }
                    node.params = out.params;
                    node.raw_params = out.raw_params;
                    node.children = out.children;
                    // The closing half stays: same name, enforced
                } else {
                    log::warn!("Discarding foreign node from double tag {:?}", node.name);
                }
                None
            }
        }
    }
}

/// Apply a hook-provided replacement value onto a tag.
fn apply_replacement(node: &mut Node, value: &JsonValue) {
    let text = value_to_text(value);
    if node.is_double() {
        node.children = Some(vec![Node::raw(node.index, text)]);
    } else {
        node.raw_text = text;
    }
}
