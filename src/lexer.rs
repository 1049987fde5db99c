//! Streaming lexer for tagweave
//!
//! The lexer is an explicit character state machine. Text is pushed into it
//! in chunks of any size (`push`), and `finish` flushes whatever is still
//! pending and returns the token list. The machine never fails on malformed
//! input: any character that does not fit the current state demotes the
//! half-built tag back to raw text and the machine keeps going. The only
//! hard invariant is that concatenating all tokens' `raw_text` reproduces
//! the input byte-for-byte.

use thiserror::Error;

use crate::ast::{is_name_char, is_name_start, to_camel_case, Node, Params, MAX_NAME_LEN};
use crate::config::Config;
use crate::expr::{ExprHost, SimpleExpr};

#[derive(Error, Debug)]
pub enum LexError {
    #[error("The lexing is finished")]
    Finished,
    #[error("Invalid lexer state: {state:?} at char {ch:?} (prior {prior:?})")]
    InvalidState {
        state: State,
        prior: State,
        ch: char,
    },
}

/// Lexer states. One per structural position inside a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    RawText,
    OpenTag,
    TagName,
    InsideTag,
    ParamName,
    ParamEqual,
    ParamValue,
    CloseTag,
    Final,
}

const QUOTES: [char; 3] = ['\'', '"', '`'];

fn is_quote(c: char) -> bool {
    QUOTES.contains(&c)
}

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// The streaming tokenizer.
///
/// ```
/// use tagweave::{Config, Lexer};
///
/// let mut lexer = Lexer::new(Config::default());
/// lexer.push("some <incre").unwrap();
/// lexer.push("ment /> text").unwrap();
/// let tokens = lexer.finish().unwrap();
/// assert_eq!(tokens.len(), 3);
/// assert_eq!(tokens[1].name.as_deref(), Some("increment"));
/// ```
pub struct Lexer<'h> {
    state: State,
    prior_state: State,
    cfg: Config,
    host: &'h dyn ExprHost,
    pending: Node,
    param_key: Option<String>,
    param_value: Option<String>,
    processed: Vec<Node>,
    offset: usize,
}

impl<'h> Lexer<'h> {
    pub fn new(cfg: Config) -> Lexer<'static> {
        Lexer::with_host(cfg, &SimpleExpr)
    }

    /// Use a custom expression host for the expression-value parse probe.
    pub fn with_host(cfg: Config, host: &'h dyn ExprHost) -> Lexer<'h> {
        Lexer {
            state: State::RawText,
            prior_state: State::RawText,
            cfg,
            host,
            pending: Node::default(),
            param_key: None,
            param_value: None,
            processed: Vec::new(),
            offset: 0,
        }
    }

    /// Shortcut for `push` + `finish` on a complete input.
    pub fn lex(&mut self, text: &str) -> Result<Vec<Node>, LexError> {
        self.push(text)?;
        self.finish()
    }

    /// Clear all state so the lexer can be reused.
    pub fn reset(&mut self) {
        self.state = State::RawText;
        self.prior_state = State::RawText;
        self.pending = Node::default();
        self.param_key = None;
        self.param_value = None;
        self.processed.clear();
        self.offset = 0;
    }

    fn transition(&mut self, new_state: State) {
        self.prior_state = self.state;
        self.state = new_state;
    }

    /// Push the pending token onto the processed list and start a new one.
    fn commit_pending(&mut self) {
        if self.pending.raw_text.is_empty() {
            return;
        }
        let mut token = std::mem::take(&mut self.pending);
        if let Some(name) = token.name.take() {
            token.name = Some(to_camel_case(&name));
        }
        token.index = self.offset;
        self.offset += token.raw_text.len();
        self.processed.push(token);
    }

    /// Demote the half-built tag back to plain raw text, keeping every byte.
    fn demote_pending(&mut self) {
        let index = self.pending.index;
        let raw_text = std::mem::take(&mut self.pending.raw_text);
        self.pending = Node::raw(index, raw_text);
        self.param_key = None;
        self.param_value = None;
    }

    /// Abandon the current tag attempt: the offending character joins the
    /// accumulated text, everything becomes raw text again.
    fn abort_tag(&mut self, c: char) {
        self.pending.raw_text.push(c);
        self.demote_pending();
        self.transition(State::RawText);
    }

    /// Commit the pending parameter key/value pair into the params maps.
    fn commit_param(&mut self, quoted: bool) {
        let Some(key) = self.param_key.take() else {
            return;
        };
        let raw_value = self.param_value.take().unwrap_or_default();
        let key = if key == "0" { key } else { to_camel_case(&key) };

        let value = if quoted {
            // Strip the surrounding quotes; quoted JSON objects/arrays are
            // parsed structurally, everything else stays a string
            let inner = &raw_value[1..raw_value.len().saturating_sub(1)];
            let looks_json = (inner.starts_with('{') && inner.ends_with('}'))
                || (inner.starts_with('[') && inner.ends_with(']'));
            if looks_json {
                serde_json::from_str(inner).unwrap_or_else(|_| inner.into())
            } else {
                inner.into()
            }
        } else if raw_value.starts_with(self.cfg.open_expr) {
            // Expression values stay raw until interpolation
            raw_value.clone().into()
        } else {
            // Bare JSON scalar, or a plain word
            serde_json::from_str(&raw_value).unwrap_or_else(|_| raw_value.clone().into())
        };

        self.pending
            .params
            .get_or_insert_with(Params::new)
            .insert(key.clone(), value);
        self.pending
            .raw_params
            .get_or_insert_with(Default::default)
            .insert(key, raw_value);
    }

    /// Feed more input into the machine. Any number of characters may be
    /// pushed at a time; a tag split across chunks stays pending.
    pub fn push(&mut self, text: &str) -> Result<(), LexError> {
        if self.state == State::Final {
            return Err(LexError::Finished);
        }

        let Config {
            open_tag,
            close_tag,
            last_stopper,
            open_expr,
            close_expr,
        } = self.cfg;

        for c in text.chars() {
            match self.state {
                State::RawText => {
                    // Could this be the beginning of a new tag?
                    if c == open_tag {
                        self.commit_pending();
                        self.transition(State::OpenTag);
                    }
                    self.pending.raw_text.push(c);
                }

                State::OpenTag => {
                    if is_name_start(c) {
                        // The beginning of a tag name
                        self.pending.raw_text.push(c);
                        self.pending.name = Some(c.to_string());
                        self.transition(State::TagName);
                    } else if c == last_stopper
                        && self.pending.name.is_none()
                        && self.pending.raw_text.chars().eq([open_tag])
                    {
                        // The start of the second half of a double tag
                        self.pending.raw_text.push(c);
                        self.pending.double = true;
                    } else if is_space(c)
                        && self.pending.name.is_none()
                        && !self.pending.raw_text.ends_with([' ', '\t'])
                    {
                        // A single space before the tag name
                        self.pending.raw_text.push(c);
                    } else if c == open_tag {
                        // A fake open tag; maybe this one is real
                        self.demote_pending();
                        self.commit_pending();
                        self.transition(State::OpenTag);
                        self.pending.raw_text.push(c);
                    } else {
                        self.abort_tag(c);
                    }
                }

                State::TagName => {
                    if self.pending.name.is_none() {
                        return self.invalid_state(c);
                    }
                    let name_len = self.pending.name.as_ref().map_or(0, |n| n.chars().count());
                    if is_name_char(c) && name_len < MAX_NAME_LEN {
                        self.pending.raw_text.push(c);
                        if let Some(name) = &mut self.pending.name {
                            name.push(c);
                        }
                    } else if is_space(c) {
                        self.pending.raw_text.push(c);
                        self.transition(State::InsideTag);
                    } else if c == last_stopper {
                        // A single tag, e.g. <stuff/>
                        self.pending.raw_text.push(c);
                        self.pending.single = true;
                        self.transition(State::CloseTag);
                    } else if c == close_tag {
                        // The end of the first half of a double tag
                        self.pending.raw_text.push(c);
                        self.pending.double = true;
                        self.commit_pending();
                        self.transition(State::RawText);
                    } else {
                        self.abort_tag(c);
                    }
                }

                State::InsideTag => {
                    if self.pending.name.is_none() {
                        return self.invalid_state(c);
                    }
                    if c == last_stopper {
                        self.pending.raw_text.push(c);
                        self.pending.single = true;
                        self.transition(State::CloseTag);
                    } else if c == close_tag {
                        self.pending.raw_text.push(c);
                        self.pending.double = true;
                        self.commit_pending();
                        self.transition(State::RawText);
                    } else if (is_quote(c) || c == open_expr) && self.pending.params.is_none() {
                        // The start of the ZERO param value
                        // Only one is allowed, and it must be first
                        self.pending.raw_text.push(c);
                        self.pending.params = Some(Params::new());
                        self.param_key = Some("0".to_string());
                        self.param_value = Some(c.to_string());
                        self.transition(State::ParamValue);
                    } else if is_space(c) {
                        self.pending.raw_text.push(c);
                    } else if is_name_start(c) {
                        // The beginning of a param name
                        self.pending.raw_text.push(c);
                        self.pending.params.get_or_insert_with(Params::new);
                        self.param_key = Some(c.to_string());
                        self.transition(State::ParamName);
                    } else {
                        self.abort_tag(c);
                    }
                }

                State::ParamName => {
                    let Some(key) = &mut self.param_key else {
                        return self.invalid_state(c);
                    };
                    if is_name_char(c) && key.chars().count() < MAX_NAME_LEN {
                        key.push(c);
                        self.pending.raw_text.push(c);
                    } else if c == '=' {
                        self.pending.raw_text.push(c);
                        self.transition(State::ParamEqual);
                    } else {
                        self.abort_tag(c);
                    }
                }

                State::ParamEqual => {
                    if self.param_key.is_none() {
                        return self.invalid_state(c);
                    }
                    if !is_space(c) && c != last_stopper {
                        self.pending.raw_text.push(c);
                        self.param_value = Some(c.to_string());
                        self.transition(State::ParamValue);
                    } else {
                        self.abort_tag(c);
                    }
                }

                State::ParamValue => {
                    if self.param_key.is_none() || self.param_value.is_none() {
                        return self.invalid_state(c);
                    }
                    let first = self
                        .param_value
                        .as_ref()
                        .and_then(|v| v.chars().next())
                        .unwrap_or_default();
                    let quoted = is_quote(first);
                    let backtick = first == '`';
                    let expr = first == open_expr;

                    if c == '\n' && !backtick {
                        // Newlines only survive inside backtick values
                        self.abort_tag(c);
                    } else if quoted
                        && c == first
                        && self.param_key.as_deref() == Some("0")
                        && self.param_value.as_ref().is_some_and(|v| v.chars().count() == 1)
                    {
                        // Empty ZERO param values make no sense, e.g. <cmd ""/>
                        self.abort_tag(c);
                    } else if quoted && c == first {
                        // The closing quote
                        self.pending.raw_text.push(c);
                        if let Some(v) = &mut self.param_value {
                            v.push(c);
                        }
                        self.commit_param(true);
                        self.transition(State::InsideTag);
                    } else if expr && c == close_expr {
                        self.pending.raw_text.push(c);
                        if let Some(v) = &mut self.param_value {
                            v.push(c);
                        }
                        // An expression value ends only when its body parses
                        // as a standalone expression; delimiters are fine
                        // inside as long as the probe says "not yet"
                        let done = {
                            let v = self.param_value.as_deref().unwrap_or_default();
                            let body = &v[open_expr.len_utf8()..v.len() - close_expr.len_utf8()];
                            self.host.probe(body)
                        };
                        if done {
                            self.commit_param(false);
                            self.transition(State::InsideTag);
                        }
                    } else if c == last_stopper && !quoted && !expr {
                        // A single tag with a bare last value, e.g. <x a=1/>
                        self.pending.raw_text.push(c);
                        self.pending.single = true;
                        self.commit_param(false);
                        self.transition(State::CloseTag);
                    } else if c == close_tag && !quoted && !expr {
                        self.pending.raw_text.push(c);
                        self.pending.double = true;
                        self.commit_param(false);
                        self.commit_pending();
                        self.transition(State::RawText);
                    } else if is_space(c) && !quoted && !expr {
                        self.pending.raw_text.push(c);
                        self.commit_param(false);
                        self.transition(State::InsideTag);
                    } else {
                        self.pending.raw_text.push(c);
                        if let Some(v) = &mut self.param_value {
                            v.push(c);
                        }
                    }
                }

                State::CloseTag => {
                    if c == close_tag {
                        self.pending.raw_text.push(c);
                        self.commit_pending();
                        self.transition(State::RawText);
                    } else {
                        self.abort_tag(c);
                    }
                }

                State::Final => return Err(LexError::Finished),
            }
        }

        Ok(())
    }

    /// This is the defensive trap for an unreachable machine state. It
    /// resets the lexer and surfaces the error.
    fn invalid_state(&mut self, c: char) -> Result<(), LexError> {
        let err = LexError::InvalidState {
            state: self.state,
            prior: self.prior_state,
            ch: c,
        };
        log::error!("Lexer invariant violated, this is a bug: {err}");
        self.reset();
        Err(err)
    }

    /// Drop all pending state, demoting any half-built tag to raw text,
    /// and permanently close the lexer.
    pub fn finish(&mut self) -> Result<Vec<Node>, LexError> {
        if self.state == State::Final {
            return Err(LexError::Finished);
        }

        self.demote_pending();
        self.commit_pending();

        // Compact adjacent raw-text tokens
        let mut tokens: Vec<Node> = Vec::with_capacity(self.processed.len());
        for tok in self.processed.drain(..) {
            match tokens.last_mut() {
                Some(last) if last.is_raw_text() && tok.is_raw_text() => {
                    last.raw_text.push_str(&tok.raw_text);
                }
                _ => tokens.push(tok),
            }
        }
        if tokens.is_empty() {
            tokens.push(Node::default());
        }

        self.transition(State::Final);
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lex(text: &str) -> Vec<Node> {
        Lexer::new(Config::default()).lex(text).unwrap()
    }

    fn roundtrip(text: &str) {
        let tokens = lex(text);
        let rebuilt: String = tokens.iter().map(|t| t.raw_text.clone()).collect();
        assert_eq!(rebuilt, text, "lexer must not lose bytes");
    }

    #[test]
    fn lex_plain_text() {
        let tokens = lex("hello world");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_raw_text());
        assert_eq!(tokens[0].raw_text, "hello world");
    }

    #[test]
    fn lex_single_tag() {
        let tokens = lex("a <stuff /> b");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].raw_text, "a ");
        assert!(tokens[1].is_single());
        assert_eq!(tokens[1].name.as_deref(), Some("stuff"));
        assert_eq!(tokens[1].raw_text, "<stuff />");
        assert_eq!(tokens[1].index, 2);
        assert_eq!(tokens[2].raw_text, " b");
    }

    #[test]
    fn lex_double_tag_halves() {
        let tokens = lex("<upper>text</upper>");
        assert_eq!(tokens.len(), 3);
        assert!(tokens[0].is_double());
        assert_eq!(tokens[0].raw_text, "<upper>");
        assert!(tokens[1].is_raw_text());
        assert!(tokens[2].is_double());
        assert_eq!(tokens[2].raw_text, "</upper>");
        assert_eq!(tokens[2].name.as_deref(), Some("upper"));
    }

    #[test]
    fn lex_params() {
        let tokens = lex("<randomInt min=1 max=10 />");
        assert_eq!(tokens.len(), 1);
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("min"), Some(&json!(1)));
        assert_eq!(params.get("max"), Some(&json!(10)));
    }

    #[test]
    fn lex_quoted_params() {
        let tokens = lex(r#"<greet name="Ana" mode='warm' tpl=`hi` />"#);
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("name"), Some(&json!("Ana")));
        assert_eq!(params.get("mode"), Some(&json!("warm")));
        assert_eq!(params.get("tpl"), Some(&json!("hi")));
        let raw = tokens[0].raw_params.as_ref().unwrap();
        assert_eq!(raw.get("name").unwrap(), "\"Ana\"");
        assert_eq!(raw.get("tpl").unwrap(), "`hi`");
    }

    #[test]
    fn lex_bare_scalars() {
        let tokens = lex("<t a=true b=null c=3.14 d=word />");
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("a"), Some(&json!(true)));
        assert_eq!(params.get("b"), Some(&json!(null)));
        assert_eq!(params.get("c"), Some(&json!(3.14)));
        assert_eq!(params.get("d"), Some(&json!("word")));
    }

    #[test]
    fn lex_quoted_json_value() {
        let tokens = lex(r#"<t data='{"a": 1}' />"#);
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("data"), Some(&json!({ "a": 1 })));
    }

    #[test]
    fn lex_zero_param() {
        let tokens = lex("<cmd 'ls -la' />");
        assert!(tokens[0].is_single());
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("0"), Some(&json!("ls -la")));
    }

    #[test]
    fn lex_zero_param_with_inner_quotes() {
        let tokens = lex(r#"<cmd '"x"' />"#);
        assert!(tokens[0].is_single());
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("0"), Some(&json!("\"x\"")));
    }

    #[test]
    fn lex_empty_zero_param_aborts() {
        let tokens = lex("<cmd '' />");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_raw_text());
        roundtrip("<cmd '' />");
    }

    #[test]
    fn lex_second_zero_param_not_allowed() {
        // A quote after the first param is not a zero param anymore
        let tokens = lex("<t a=1 'x' />");
        assert!(tokens[0].is_raw_text());
        roundtrip("<t a=1 'x' />");
    }

    #[test]
    fn lex_expression_param() {
        let tokens = lex("<t val={user.id} />");
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("val"), Some(&json!("{user.id}")));
        let raw = tokens[0].raw_params.as_ref().unwrap();
        assert_eq!(raw.get("val").unwrap(), "{user.id}");
    }

    #[test]
    fn lex_expression_with_inner_delimiters() {
        // The first close-expr char does not parse, so the value keeps going
        let tokens = lex(r#"<t val={{"a": 1}} />"#);
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("val"), Some(&json!(r#"{{"a": 1}}"#)));
    }

    #[test]
    fn lex_camel_case_normalization() {
        let tokens = lex("<random_int min_val=2 />");
        assert_eq!(tokens[0].name.as_deref(), Some("randomInt"));
        let params = tokens[0].params.as_ref().unwrap();
        assert!(params.contains_key("minVal"));
    }

    #[test]
    fn lex_newline_aborts_value() {
        let text = "<t a=1\nb=2 />";
        let tokens = lex(text);
        assert!(tokens[0].is_raw_text());
        roundtrip(text);
    }

    #[test]
    fn lex_newline_ok_in_backtick() {
        let tokens = lex("<t a=`line1\nline2` />");
        let params = tokens[0].params.as_ref().unwrap();
        assert_eq!(params.get("a"), Some(&json!("line1\nline2")));
    }

    #[test]
    fn lex_broken_tags_become_raw_text() {
        for text in [
            "<",
            "< ",
            "<>",
            "<123/>",
            "<Upper>nope</Upper>",
            "<tag!>",
            "<tag a=>",
            "<tag a",
            "text < other > text",
            "<foo<bar",
        ] {
            roundtrip(text);
        }
    }

    #[test]
    fn lex_fake_then_real_open() {
        let tokens = lex("<<stuff/>");
        assert_eq!(tokens.len(), 2);
        assert!(tokens[0].is_raw_text());
        assert_eq!(tokens[0].raw_text, "<");
        assert!(tokens[1].is_single());
    }

    #[test]
    fn lex_name_too_long_aborts() {
        let name = "a".repeat(50);
        let text = format!("<{name}/>");
        let tokens = Lexer::new(Config::default()).lex(&text).unwrap();
        assert!(tokens[0].is_raw_text());
    }

    #[test]
    fn lex_streaming_chunks() {
        let mut lexer = Lexer::new(Config::default());
        for chunk in ["before <incr", "ement a", "=1 /> after"] {
            lexer.push(chunk).unwrap();
        }
        let tokens = lexer.finish().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].name.as_deref(), Some("increment"));
        assert_eq!(
            tokens[1].params.as_ref().unwrap().get("a"),
            Some(&json!(1))
        );
    }

    #[test]
    fn lex_after_finish_fails() {
        let mut lexer = Lexer::new(Config::default());
        lexer.push("x").unwrap();
        lexer.finish().unwrap();
        assert!(matches!(lexer.push("y"), Err(LexError::Finished)));
        assert!(matches!(lexer.finish(), Err(LexError::Finished)));
    }

    #[test]
    fn lex_reset_allows_reuse() {
        let mut lexer = Lexer::new(Config::default());
        lexer.push("<a>").unwrap();
        lexer.finish().unwrap();
        lexer.reset();
        let tokens = lexer.lex("fresh").unwrap();
        assert_eq!(tokens[0].raw_text, "fresh");
    }

    #[test]
    fn lex_custom_delimiters() {
        let cfg = Config {
            open_tag: '{',
            close_tag: '}',
            last_stopper: '?',
            open_expr: '[',
            close_expr: ']',
        };
        let tokens = Lexer::new(cfg).lex("x {stuff ?} y").unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(tokens[1].is_single());
        assert_eq!(tokens[1].raw_text, "{stuff ?}");
    }

    #[test]
    fn lex_closing_half_requires_stopper_after_open() {
        let tokens = lex("</stuff>");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_double());
        assert_eq!(tokens[0].name.as_deref(), Some("stuff"));
    }

    #[test]
    fn lex_indexes_are_byte_offsets() {
        let tokens = lex("ab<x/>cd<y/>");
        let mut offset = 0;
        for t in &tokens {
            assert_eq!(t.index, offset);
            offset += t.raw_text.len();
        }
    }
}
