//! Tree parser for tagweave
//!
//! Takes the lexer's flat token stream and reshapes it into a forest:
//! single tags and raw text stay leaves, double-tag halves are reconciled
//! into one node owning its children. An opening half goes on a stack; a
//! closing half is matched by name against the stack, and anything it
//! crosses on the way down is demoted back to raw text. Unclosed halves and
//! stray closers are demoted too, so the parse never fails and `unparse`
//! always reproduces the input.

use crate::ast::{is_name_start, Node};
use crate::config::Config;
use crate::lexer::{LexError, Lexer};

/// Lex and parse in one step.
pub fn parse(text: &str, cfg: &Config) -> Result<Vec<Node>, LexError> {
    let tokens = Lexer::new(*cfg).lex(text)?;
    Ok(parse_tokens(tokens, cfg))
}

/// Reconcile a token stream into a forest.
pub fn parse_tokens(tokens: Vec<Node>, cfg: &Config) -> Vec<Node> {
    let mut builder = Builder {
        cfg: *cfg,
        ast: Vec::new(),
        stack: Vec::new(),
    };
    builder.run(tokens);
    builder.ast
}

/// Does this raw text open a double tag?
/// Shape: open char, optional spaces, then a name-start letter.
fn is_first_start(raw: &str, cfg: &Config) -> bool {
    let mut chars = raw.chars();
    if chars.next() != Some(cfg.open_tag) {
        return false;
    }
    for c in chars {
        if c == ' ' {
            continue;
        }
        return is_name_start(c);
    }
    false
}

/// Does this raw text close a double tag?
/// Shape: open char, stopper, optional spaces, then a name-start letter.
fn is_second_start(raw: &str, cfg: &Config) -> bool {
    let mut chars = raw.chars();
    if chars.next() != Some(cfg.open_tag) || chars.next() != Some(cfg.last_stopper) {
        return false;
    }
    for c in chars {
        if c == ' ' {
            continue;
        }
        return is_name_start(c);
    }
    false
}

struct Builder {
    cfg: Config,
    ast: Vec<Node>,
    stack: Vec<Node>,
}

impl Builder {
    fn run(&mut self, tokens: Vec<Node>) {
        for token in tokens {
            if token.raw_text.is_empty() {
                continue;
            }

            if token.is_double() {
                if is_first_start(&token.raw_text, &self.cfg) {
                    // The start of a double tag. Everything that follows
                    // becomes a child until it is closed, or proven invalid.
                    let mut token = token;
                    token.first_tag_text = Some(token.raw_text.clone());
                    self.stack.push(token);
                } else if is_second_start(&token.raw_text, &self.cfg) {
                    self.close_double(token);
                } else {
                    // A double half with an unrecognizable shape
                    self.commit(Node::raw(token.index, token.raw_text));
                }
            } else {
                self.commit(token);
            }
        }
        self.drain();
    }

    /// Attach a finished node to the innermost open double tag, or to the
    /// top level. Adjacent raw text merges.
    fn commit(&mut self, mut token: Node) {
        if let Some(top) = self.stack.last_mut() {
            let parent_path = top.path.clone();
            let children = top.children.get_or_insert_with(Vec::new);
            if let Some(last) = children.last_mut() {
                if last.is_raw_text() && token.is_raw_text() {
                    last.raw_text.push_str(&token.raw_text);
                    return;
                }
            }
            assign_path(&mut token, parent_path.as_deref(), children.len());
            children.push(token);
        } else {
            if let Some(last) = self.ast.last_mut() {
                if last.is_raw_text() && token.is_raw_text() {
                    last.raw_text.push_str(&token.raw_text);
                    return;
                }
            }
            assign_path(&mut token, None, self.ast.len());
            self.ast.push(token);
        }
    }

    /// A closing half arrived: match it against the stack by name. Crossed
    /// opening halves are demoted to raw text; an unmatched closer is
    /// demoted itself.
    fn close_double(&mut self, token: Node) {
        if self.stack.last().map(|t| &t.name) == Some(&token.name) {
            self.commit_double(token);
            return;
        }
        let matched = self
            .stack
            .iter()
            .rposition(|open| open.name == token.name);
        if let Some(at) = matched {
            // Unwind: everything above the match was never a real tag
            while self.stack.len() > at + 1 {
                let mut fake = self.stack.pop().unwrap();
                let text = fake.first_tag_text.take().unwrap_or(fake.raw_text);
                self.commit(Node::raw(fake.index, text));
                if let Some(children) = fake.children.take() {
                    for child in children {
                        self.commit(child);
                    }
                }
            }
            self.commit_double(token);
        } else {
            // A stray closer, e.g. "</xyz>" with no open "<xyz>"
            self.commit(Node::raw(token.index, token.raw_text));
        }
    }

    /// Pop the matching opening half and finish the double tag.
    fn commit_double(&mut self, token: Node) {
        let mut double = self.stack.pop().unwrap();
        double.second_tag_text = Some(token.raw_text);
        // A valid double tag carries no raw text of its own
        double.raw_text.clear();

        if let Some(parent) = self.stack.last_mut() {
            let parent_path = parent.path.clone();
            let children = parent.children.get_or_insert_with(Vec::new);
            assign_path(&mut double, parent_path.as_deref(), children.len());
            reassign_child_paths(&mut double);
            children.push(double);
        } else {
            assign_path(&mut double, None, self.ast.len());
            reassign_child_paths(&mut double);
            self.ast.push(double);
        }
    }

    /// End of input: whatever is still open on the stack was never closed.
    fn drain(&mut self) {
        let leftover = std::mem::take(&mut self.stack);
        for mut token in leftover {
            let children = token.children.take();
            self.final_commit(token);
            if let Some(children) = children {
                for child in children {
                    self.final_commit(child);
                }
            }
        }
    }

    fn final_commit(&mut self, mut token: Node) {
        let top_is_raw = self.ast.last().map(|t| t.is_raw_text()).unwrap_or(false);
        if top_is_raw && token.is_raw_text() {
            let last = self.ast.last_mut().unwrap();
            last.raw_text.push_str(&token.raw_text);
        } else if token.is_single() || token.is_full_double() {
            assign_path(&mut token, None, self.ast.len());
            self.ast.push(token);
        } else {
            // An unfinished half: only its opening text survives
            let text = token.first_tag_text.take().unwrap_or(token.raw_text);
            if top_is_raw {
                let last = self.ast.last_mut().unwrap();
                last.raw_text.push_str(&text);
            } else {
                self.ast.push(Node::raw(token.index, text));
            }
        }
    }
}

/// Give a tag node its dot-notation address.
fn assign_path(node: &mut Node, parent_path: Option<&str>, index: usize) {
    if node.name.is_some() && (node.single || node.double) {
        node.path = Some(match parent_path {
            Some(p) => format!("{p}.children.{index}"),
            None => index.to_string(),
        });
    }
}

/// Re-address every tag in a finished subtree. Needed because children were
/// committed before the subtree found its final position.
fn reassign_child_paths(node: &mut Node) {
    let parent_path = node.path.clone();
    if let Some(children) = &mut node.children {
        for (i, child) in children.iter_mut().enumerate() {
            if child.name.is_some() && (child.single || child.double) {
                child.path = Some(format!(
                    "{}.children.{i}",
                    parent_path.as_deref().unwrap_or_default()
                ));
            }
            reassign_child_paths(child);
        }
    }
}
