//! Full render passes over in-memory templates.

use std::cell::Cell;
use std::rc::Rc;

use tagweave::{render_text, Config, HookRegistry, Params, Registry, TagError, TagOutput};

fn fixtures() -> Registry {
    let mut reg = Registry::new();
    reg.register("upper", |text, _p, _m| {
        Ok(TagOutput::text(text.to_uppercase()))
    });
    reg.register("increment", |text, params, _m| {
        let n: i64 = text
            .trim()
            .parse()
            .map_err(|_| TagError::Failed(format!("not a number: {text:?}")))?;
        let by = params.get("by").and_then(|v| v.as_i64()).unwrap_or(1);
        Ok(TagOutput::text((n + by).to_string()))
    });
    reg.register("sortLines", |text, _p, _m| {
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort_unstable();
        Ok(TagOutput::text(lines.join("\n")))
    });
    reg
}

fn render(text: &str) -> String {
    render_text(
        text,
        Params::new(),
        &fixtures(),
        &HookRegistry::new(),
        Config::default(),
    )
    .unwrap()
}

#[test]
fn text_without_tags_is_untouched() {
    for text in [
        "",
        "no tags at all",
        "broken <tag and < other > stuff",
        "a lonely </closer>",
    ] {
        assert_eq!(render(text), text);
    }
}

#[test]
fn unknown_tags_survive_verbatim() {
    let text = "<weather city=\"Oslo\"/> and <llm>prompt</llm>";
    assert_eq!(render(text), text);
}

#[test]
fn double_tag_replaces_only_its_content() {
    assert_eq!(
        render("keep <upper>me loud</upper> keep"),
        "keep <upper>ME LOUD</upper> keep"
    );
}

#[test]
fn nested_tags_evaluate_depth_first() {
    assert_eq!(
        render("<upper><sortLines>b\na</sortLines></upper>"),
        "<upper>A\nB</upper>"
    );
}

#[test]
fn increment_cut_chain_collapses_to_plain_text() {
    let text = "<increment by=10 cut=true><increment by=990 cut=true>0</increment></increment>";
    assert_eq!(render(text), "1000");
}

#[test]
fn cut_on_the_outer_tag_swallows_the_inner_markup() {
    // The inner tags run first, then the consumed outer tag discards them
    let text = "<increment cut=true><increment><increment>997</increment></increment></increment>";
    assert_eq!(render(text), "1000");
}

#[test]
fn nondeterministic_tags_stay_within_their_bounds() {
    use std::collections::hash_map::RandomState;
    use std::collections::HashSet;
    use std::hash::{BuildHasher, Hasher};

    let mut reg = Registry::new();
    reg.register("randomInt", |_t, params, _m| {
        let min = params.get("min").and_then(|v| v.as_i64()).unwrap_or(0);
        let max = params.get("max").and_then(|v| v.as_i64()).unwrap_or(100);
        let n = RandomState::new().build_hasher().finish();
        let span = (max - min + 1) as u64;
        Ok(TagOutput::text((min + (n % span) as i64).to_string()))
    });

    let mut seen = HashSet::new();
    for _ in 0..16 {
        let out = render_text(
            "<randomInt min=1 max=1000000/>",
            Params::new(),
            &reg,
            &HookRegistry::new(),
            Config::default(),
        )
        .unwrap();
        let n: i64 = out.parse().expect("digits only");
        assert!((1..=1_000_000).contains(&n));
        seen.insert(out);
    }
    assert!(seen.len() > 1, "repeated renders should vary");
}

#[test]
fn sort_lines_render_is_idempotent() {
    let text = "<sortLines>pear\napple\nmango</sortLines>";
    let once = render(text);
    assert_eq!(once, "<sortLines>apple\nmango\npear</sortLines>");
    assert_eq!(render(&once), once);
}

#[test]
fn snake_case_source_reaches_camel_case_function() {
    // The lexer normalizes names at commit time
    assert_eq!(
        render("<sort_lines>b\na</sort_lines>"),
        "<sort_lines>a\nb</sort_lines>"
    );
}

#[test]
fn mismatched_closers_demote_but_matched_tags_still_run() {
    // tx is never closed and ty never opened: both demote to raw text;
    // t1 and t3 stay real tags, and unknown tags render unchanged
    let text = "<t1><tx><t3><xXx/>?</t3></ty></t1>";
    assert_eq!(render(text), text);

    let mut reg = fixtures();
    let seen = Rc::new(Cell::new(0u32));
    let seen2 = Rc::clone(&seen);
    reg.register("t3", move |_t, _p, _m| {
        seen2.set(seen2.get() + 1);
        Ok(None)
    });
    render_text(
        text,
        Params::new(),
        &reg,
        &HookRegistry::new(),
        Config::default(),
    )
    .unwrap();
    assert_eq!(seen.get(), 1, "the reconciled t3 tag must evaluate");
}

#[test]
fn zero_param_feeds_single_tags() {
    let mut reg = Registry::new();
    reg.register("echo", |text, _p, _m| Ok(TagOutput::text(text.to_string())));
    let out = render_text(
        "<echo 'direct input'/>",
        Params::new(),
        &reg,
        &HookRegistry::new(),
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "direct input");
}

#[test]
fn custom_delimiters_render_the_same_way() {
    let cfg = Config {
        open_tag: '{',
        close_tag: '}',
        last_stopper: '?',
        open_expr: '<',
        close_expr: '>',
    };
    let out = render_text(
        "ask {upper}quietly{?upper} <notatag/>",
        Params::new(),
        &fixtures(),
        &HookRegistry::new(),
        cfg,
    )
    .unwrap();
    assert_eq!(out, "ask {upper}QUIETLY{?upper} <notatag/>");
}

#[test]
fn context_variables_interpolate_into_params() {
    let mut reg = Registry::new();
    reg.register("greet", |_t, params, _m| {
        let who = params.get("who").and_then(|v| v.as_str()).unwrap_or("?");
        Ok(TagOutput::text(format!("hello {who}")))
    });
    let mut ctx = Params::new();
    ctx.insert("user".into(), serde_json::json!({ "name": "Ana" }));
    let out = render_text(
        "<greet who={user.name}/>",
        ctx,
        &reg,
        &HookRegistry::new(),
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "hello Ana");
}

#[test]
fn backtick_templates_fill_holes() {
    let mut reg = Registry::new();
    reg.register("echo", |_t, params, _m| {
        let msg = params.get("msg").and_then(|v| v.as_str()).unwrap_or("");
        Ok(TagOutput::text(msg.to_string()))
    });
    let mut ctx = Params::new();
    ctx.insert("name".into(), serde_json::json!("world"));
    let out = render_text(
        "<echo msg=`hi ${name}!`/>",
        ctx,
        &reg,
        &HookRegistry::new(),
        Config::default(),
    )
    .unwrap();
    assert_eq!(out, "hi world!");
}
