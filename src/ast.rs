//! Node data model for tagweave
//!
//! The lexer and parser share one node type. The lexer produces flat nodes
//! (raw text, single tags, double-tag halves); the parser reshapes them into
//! a forest where double tags own children. Evaluation mutates nodes in
//! place, and `unparse` turns any node back into the exact source text it
//! came from.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

/// Parameter and context values are JSON values, keyed by camelCase names.
/// `serde_json::Map` keeps insertion order, which matters for the zero param.
pub type Params = serde_json::Map<String, JsonValue>;

/// Maximum length of tag and parameter names, in characters.
pub const MAX_NAME_LEN: usize = 42;

const LOWER_ACCENTED: &str = "àáâãäæçèéêëìíîïñòóôõöùúûüýÿœ";
const UPPER_ACCENTED: &str = "ÀÁÂÃÄÆÇÈÉÊËÌÍÎÏÑÒÓÔÕÖÙÚÛÜÝŒŸ";
const LOWER_GREEK: &str = "άαβγδεζηθικλμνξοπρστυφχψω";
const UPPER_GREEK: &str = "ΆΑΒΓΔΕΖΗΘΙΚΛΜΝΞΟΠΡΣΤΥΦΧΨΩ";

/// Can this character start a tag or parameter name?
/// Only lowercase Latin and Greek letters.
pub(crate) fn is_name_start(c: char) -> bool {
    c.is_ascii_lowercase() || LOWER_ACCENTED.contains(c) || LOWER_GREEK.contains(c)
}

/// Can this character continue a tag or parameter name?
/// Letters of both cases, digits and underscore.
pub(crate) fn is_name_char(c: char) -> bool {
    c == '_'
        || c.is_ascii_alphanumeric()
        || LOWER_ACCENTED.contains(c)
        || UPPER_ACCENTED.contains(c)
        || LOWER_GREEK.contains(c)
        || UPPER_GREEK.contains(c)
}

/// Normalize a raw tag or parameter name to camelCase.
/// Delimiter runs (`-`, `_`) are removed and the following letter is
/// upper-cased: `random_int` and `random-int` both become `randomInt`.
pub fn to_camel_case(name: &str) -> String {
    if !name.contains(['-', '_']) {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' || c == '_' {
            // A leading delimiter cannot happen: names start with a letter
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// A descriptive snapshot of the parent tag, attached to children during
/// evaluation. This is a plain value, never an owning back-reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentRef {
    pub name: Option<String>,
    pub index: usize,
    pub single: bool,
    pub double: bool,
    pub params: Option<Params>,
}

/// A lexed token or a parsed tree node.
///
/// Raw text has only `index` and `raw_text` set. A recognized tag has a
/// `name` and exactly one of `single`/`double`. A fully reconciled double
/// tag has `first_tag_text`/`second_tag_text` and no leftover `raw_text`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Byte offset of this token's start in the original input
    pub index: usize,
    /// Exact source text (raw text and single tags)
    pub raw_text: String,
    /// camelCase tag name, if this is a tag
    pub name: Option<String>,
    /// Self-closing tag form, e.g. `<stuff />`
    pub single: bool,
    /// Open/close tag form, e.g. `<stuff>...</stuff>`
    pub double: bool,
    /// Parsed parameter values
    pub params: Option<Params>,
    /// Exact raw text of each parameter value, quotes and delimiters included
    pub raw_params: Option<BTreeMap<String, String>>,
    /// Exact source text of the opening delimiter (double tags)
    pub first_tag_text: Option<String>,
    /// Exact source text of the closing delimiter (double tags)
    pub second_tag_text: Option<String>,
    /// Child nodes (double tags with content)
    pub children: Option<Vec<Node>>,
    /// Dot-notation structural address, assigned post-parse (tags only)
    pub path: Option<String>,
    /// Parent snapshot, assigned during evaluation
    pub parent: Option<ParentRef>,
}

impl Node {
    /// A plain raw-text node.
    pub fn raw(index: usize, text: impl Into<String>) -> Self {
        Node {
            index,
            raw_text: text.into(),
            ..Node::default()
        }
    }

    /// Raw text: no name, no tag kind.
    pub fn is_raw_text(&self) -> bool {
        self.name.is_none() && !self.single && !self.double
    }

    /// A valid single tag: named, self-closing, carrying its source text.
    pub fn is_single(&self) -> bool {
        self.name.is_some() && self.single && !self.raw_text.is_empty()
    }

    /// A double tag (either half, or a reconciled whole).
    pub fn is_double(&self) -> bool {
        self.name.is_some() && self.double
    }

    /// A reconciled double tag with both delimiter texts present.
    pub fn is_full_double(&self) -> bool {
        self.is_double() && self.first_tag_text.is_some() && self.second_tag_text.is_some()
    }

    /// Tags marked `cut=true` collapse entirely when they produce a result.
    pub fn is_consumable(&self) -> bool {
        self.params
            .as_ref()
            .and_then(|p| p.get("cut"))
            .map(|v| v == &JsonValue::Bool(true) || v == &JsonValue::from(1))
            .unwrap_or(false)
    }

    /// The value of the unnamed zero parameter, as text.
    pub fn zero_param(&self) -> Option<String> {
        match self.params.as_ref()?.get("0")? {
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Collapse a tag into a bare raw-text node, keeping only its text.
pub fn consume_tag(node: &mut Node) {
    let index = node.index;
    let raw_text = std::mem::take(&mut node.raw_text);
    *node = Node::raw(index, raw_text);
}

/// Deep extract the inner text of a node and all its children.
/// This is what a double-tag function receives as its input text.
pub fn get_text(node: &Node) -> String {
    let Some(children) = &node.children else {
        return if node.is_raw_text() {
            node.raw_text.clone()
        } else {
            String::new()
        };
    };
    let mut text = String::new();
    for c in children {
        if c.is_double() {
            text.push_str(&get_text(c));
        } else {
            text.push_str(&c.raw_text);
        }
    }
    text
}

/// Deeply convert a node and all its children back into source text.
/// For never-evaluated trees this reproduces the input byte-for-byte.
pub fn unparse(node: &Node) -> String {
    if let Some(children) = &node.children {
        let mut text = node.first_tag_text.clone().unwrap_or_default();
        for c in children {
            text.push_str(&unparse(c));
        }
        if let Some(second) = &node.second_tag_text {
            text.push_str(second);
        }
        text
    } else if node.is_double() {
        // Empty double tag
        let mut text = node.first_tag_text.clone().unwrap_or_default();
        if let Some(second) = &node.second_tag_text {
            text.push_str(second);
        }
        text
    } else {
        // Single tag or raw text
        node.raw_text.clone()
    }
}

/// Unparse a whole forest in document order.
pub fn unparse_all(nodes: &[Node]) -> String {
    nodes.iter().map(unparse).collect()
}
