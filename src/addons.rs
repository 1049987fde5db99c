//! Stock addons
//!
//! Small middlewares built purely on the hook contract, the same way a host
//! would write its own. None of them touch the evaluator internals.

use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::cache::Cache;
use crate::hooks::{truthy, Addon, HookFlow, HookRegistry};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// `ignore` and `freeze` tags, and `freeze=true` params, protect a tag from
/// evaluation; `freezeChildren=true` protects only the children.
pub fn ignore() -> Addon {
    fn protected_name(node: &crate::ast::Node) -> bool {
        matches!(node.name.as_deref(), Some("ignore") | Some("freeze"))
    }

    let mut addon = Addon::named("ignore");
    addon.pre_eval = Some(Box::new(|node, local, _global, _meta| {
        if protected_name(node) {
            return HookFlow::Abort("protected tag".into());
        }
        if truthy(local.get("freeze")) {
            return HookFlow::Abort("frozen tag".into());
        }
        HookFlow::Continue
    }));
    addon.post_eval = Some(Box::new(|_result, _node, local, _global, _meta| {
        // A tag function may set freeze on itself through a self-rewrite
        if truthy(local.get("freeze")) {
            return HookFlow::Abort("frozen tag".into());
        }
        HookFlow::Continue
    }));
    addon.pre_children = Some(Box::new(|node, local, _global, _meta| {
        if protected_name(node)
            || truthy(local.get("freeze"))
            || truthy(local.get("freezeChildren"))
        {
            return HookFlow::SkipChildren;
        }
        HookFlow::Continue
    }));
    addon
}

/// `intoVar="name"` saves the tag's result into the global context instead
/// of the document, leaving an empty replacement behind.
pub fn into_var() -> Addon {
    let mut addon = Addon::named("into-var");
    addon.post_eval = Some(Box::new(|result, _node, _local, global, meta| {
        // The live node may already be consumed; the snapshot keeps params
        let name = meta
            .node
            .params
            .as_ref()
            .and_then(|p| p.get("intoVar"))
            .and_then(|v| v.as_str());
        let Some(name) = name else {
            return HookFlow::Continue;
        };
        let value = result.cloned().unwrap_or(JsonValue::Null);
        log::info!("Saving result into variable {name:?}");
        global.insert(name.to_string(), value);
        HookFlow::Return(JsonValue::String(String::new()))
    }));
    addon
}

/// `cache=true` with a `cacheKey` or `cacheTTL` param memoizes the tag's
/// result in the per-pass cache.
pub fn memo_cache() -> Addon {
    fn wants_cache(node: &crate::ast::Node, local: &crate::ast::Params) -> Option<String> {
        let params = node.params.as_ref()?;
        if !truthy(params.get("cache")) {
            return None;
        }
        if local.get("cacheKey").is_none() && local.get("cacheTTL").is_none() {
            return None;
        }
        let key = local
            .get("cacheKey")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| node.name.clone())?;
        Some(key)
    }

    fn cache_ttl(local: &crate::ast::Params) -> Duration {
        local
            .get("cacheTTL")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CACHE_TTL)
    }

    let mut addon = Addon::named("memo-cache");
    addon.pre_eval = Some(Box::new(|node, local, _global, meta| {
        if let Some(key) = wants_cache(node, local) {
            let ttl = cache_ttl(local);
            if let Some(value) = meta.cache.borrow_mut().get(&key, Some(ttl)) {
                log::info!("Cache hit for {key:?}");
                return HookFlow::Return(value);
            }
        }
        HookFlow::Continue
    }));
    addon.post_eval = Some(Box::new(|result, _node, local, _global, meta| {
        // Read the snapshot: a consumed single tag has no params anymore
        let key = wants_cache(&meta.node, local);
        if let (Some(key), Some(value)) = (key, result) {
            let ttl = cache_ttl(local);
            if let Err(err) = meta.cache.borrow_mut().set(&key, value.clone(), ttl) {
                log::warn!("Cannot cache result for {key:?}: {err}");
            }
        }
        HookFlow::Continue
    }));
    addon
}

/// The stock registry: ignore, into-var, memo-cache, in that order.
pub fn default_hooks() -> HookRegistry {
    let mut hooks = HookRegistry::new();
    hooks.register(ignore());
    hooks.register(into_var());
    hooks.register(memo_cache());
    hooks
}
