//! tagweave: lossless text templating
//!
//! Templates are plain text sprinkled with tags. A tag is either single
//! (`<randomInt min=1 max=10 />`) or double (`<sortLines>b\na</sortLines>`),
//! the delimiter characters are configurable, and the engine ships no tags
//! of its own: the host registers every tag function. Anything that is not
//! a recognized tag is raw text and survives rendering byte-for-byte, so
//! rendering a document with no registered tags returns it unchanged.
//!
//! The pipeline is lexer -> parser -> evaluator: a streaming character
//! state machine that never fails, a reconciling tree parser that demotes
//! malformed or mismatched tags back to raw text, and a recursive evaluator
//! threading hook middleware around every tag call.
//!
//! ```
//! use tagweave::{render_text, Config, HookRegistry, Params, Registry, TagOutput};
//!
//! let mut tags = Registry::new();
//! tags.register("upper", |text, _params, _meta| {
//!     Ok(TagOutput::text(text.to_uppercase()))
//! });
//!
//! let out = render_text(
//!     "say <upper>hello</upper> <unknown/>",
//!     Params::new(),
//!     &tags,
//!     &HookRegistry::new(),
//!     Config::default(),
//! )
//! .unwrap();
//! assert_eq!(out, "say <upper>HELLO</upper> <unknown/>");
//! ```

pub mod addons;
pub mod ast;
pub mod cache;
pub mod config;
pub mod evaluate;
pub mod expr;
pub mod hooks;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod runtime;

pub use ast::{get_text, to_camel_case, unparse, unparse_all, Node, Params, ParentRef};
pub use cache::{Cache, CacheError, MemoCache};
pub use config::{Config, ConfigError};
pub use evaluate::{EvalMeta, Evaluator};
pub use expr::{ExprError, ExprHost, SimpleExpr};
pub use hooks::{Addon, HookFlow, HookRegistry};
pub use lexer::{LexError, Lexer};
pub use parser::{parse, parse_tokens};
pub use registry::{EvalOrder, Registry, TagEntry, TagError, TagFn, TagOutput};
pub use runtime::{
    render_dir, render_file, DirOutcome, RenderOutcome, Runtime, RuntimeError, RuntimeFile,
};

/// One-shot render of an in-memory text.
pub fn render_text(
    text: &str,
    ctx: Params,
    registry: &Registry,
    hooks: &HookRegistry,
    cfg: Config,
) -> Result<String, RuntimeError> {
    let mut rt = Runtime::from_text(text, cfg, registry, hooks)?;
    rt.set_context(ctx);
    Ok(rt.render().text)
}
