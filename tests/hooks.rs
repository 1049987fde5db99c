//! Hook middleware behavior through the public API.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use tagweave::addons::default_hooks;
use tagweave::{
    parse, render_text, unparse_all, Addon, Config, Evaluator, HookFlow, HookRegistry, Params,
    Registry, TagOutput,
};

fn counting_registry() -> (Registry, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0u32));
    let calls2 = Rc::clone(&calls);
    let mut reg = Registry::new();
    reg.register("tick", move |_t, _p, _m| {
        calls2.set(calls2.get() + 1);
        Ok(TagOutput::text(calls2.get().to_string()))
    });
    (reg, calls)
}

#[test]
fn freeze_protects_a_tag_and_its_output() {
    let (reg, calls) = counting_registry();
    let hooks = default_hooks();
    let out = render_text(
        "<tick freeze=true/> <tick/>",
        Params::new(),
        &reg,
        &hooks,
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "<tick freeze=true/> 1");
    assert_eq!(calls.get(), 1);
}

#[test]
fn frozen_random_output_is_byte_identical() {
    // A changing tag under freeze must render the same bytes every pass
    let (reg, _calls) = counting_registry();
    let hooks = default_hooks();
    let text = "<tick freeze=true/>";
    let once = render_text(text, Params::new(), &reg, &hooks, Config::default()).unwrap();
    let twice = render_text(&once, Params::new(), &reg, &hooks, Config::default()).unwrap();
    assert_eq!(once, text);
    assert_eq!(twice, text);
}

#[test]
fn freeze_tag_shields_its_subtree() {
    let (reg, calls) = counting_registry();
    let hooks = default_hooks();
    let text = "<freeze><tick/></freeze>";
    let out = render_text(text, Params::new(), &reg, &hooks, Config::default()).unwrap();
    assert_eq!(out, text);
    assert_eq!(calls.get(), 0);
}

#[test]
fn freeze_children_stops_the_walk_not_the_parent() {
    let (reg, calls) = counting_registry();
    let hooks = default_hooks();
    let out = render_text(
        "<keep freezeChildren=true><tick/></keep>",
        Params::new(),
        &reg,
        &hooks,
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "<keep freezeChildren=true><tick/></keep>");
    assert_eq!(calls.get(), 0);
}

#[test]
fn into_var_diverts_output_into_the_context() {
    let (reg, _) = counting_registry();
    let hooks = default_hooks();
    let cfg = Config::default();
    let mut nodes = parse("<tick intoVar=\"seen\"/>", &cfg).unwrap();
    let eval = Evaluator::new(&reg, &hooks, cfg);
    let mut ctx = Params::new();
    eval.evaluate_all(&mut nodes, &mut ctx);
    assert_eq!(unparse_all(&nodes), "");
    assert_eq!(ctx.get("seen"), Some(&json!("1")));
}

#[test]
fn memo_cache_runs_the_function_once_per_key() {
    let (reg, calls) = counting_registry();
    let hooks = default_hooks();
    let out = render_text(
        "<tick cache=true cacheKey=\"k\" cut=true/> <tick cache=true cacheKey=\"k\" cut=true/>",
        Params::new(),
        &reg,
        &hooks,
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "1 1");
    assert_eq!(calls.get(), 1);
}

#[test]
fn cache_does_not_leak_between_passes() {
    let (reg, calls) = counting_registry();
    let hooks = default_hooks();
    let text = "<tick cache=true cacheKey=\"k\" cut=true/>";
    let a = render_text(text, Params::new(), &reg, &hooks, Config::default()).unwrap();
    let b = render_text(text, Params::new(), &reg, &hooks, Config::default()).unwrap();
    assert_eq!(a, "1");
    assert_eq!(b, "2");
    assert_eq!(calls.get(), 2);
}

#[test]
fn custom_addon_order_matters() {
    // A Return from an earlier pre-eval hook wins over a later one
    let mut hooks = HookRegistry::new();
    let mut first = Addon::named("first");
    first.pre_eval = Some(Box::new(|_n, _l, _g, _m| HookFlow::Return(json!("first"))));
    let mut second = Addon::named("second");
    second.pre_eval = Some(Box::new(|_n, _l, _g, _m| HookFlow::Return(json!("second"))));
    hooks.register(first);
    hooks.register(second);

    let (reg, calls) = counting_registry();
    let out = render_text(
        "<tick>body</tick>",
        Params::new(),
        &reg,
        &hooks,
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "<tick>first</tick>");
    assert_eq!(calls.get(), 0);
}

#[test]
fn abort_from_post_eval_keeps_the_raw_result() {
    // A single tag is consumed by its own output before post-eval hooks
    // run; an abort there cannot resurrect it, only stop later hooks
    let mut hooks = HookRegistry::new();
    let stored = Rc::new(Cell::new(false));
    let stored2 = Rc::clone(&stored);
    let mut wall = Addon::named("wall");
    wall.post_eval = Some(Box::new(|_r, _n, _l, _g, _m| {
        HookFlow::Abort("no further hooks".into())
    }));
    let mut late = Addon::named("late");
    late.post_eval = Some(Box::new(move |_r, _n, _l, _g, _m| {
        stored2.set(true);
        HookFlow::Continue
    }));
    hooks.register(wall);
    hooks.register(late);

    let (reg, _) = counting_registry();
    let out = render_text(
        "<tick/>",
        Params::new(),
        &reg,
        &hooks,
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "1");
    assert!(!stored.get(), "the aborted hook chain must stop");
}
