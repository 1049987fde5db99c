//! Render runtime
//!
//! A [`Runtime`] owns the parsed forest of one source (a text or a file)
//! plus the per-source state a render pass needs: the global context seed,
//! the input content hash, and the re-entrancy guard. Rendering never
//! mutates the stored forest, so a runtime can render the same source many
//! times; `changed` compares input and output content hashes.

use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha224};
use thiserror::Error;

use crate::ast::{unparse_all, Node, Params};
use crate::cache::{Cache, MemoCache};
use crate::config::{Config, ConfigError};
use crate::evaluate::Evaluator;
use crate::expr::{ExprHost, SimpleExpr};
use crate::hooks::HookRegistry;
use crate::lexer::{LexError, Lexer};
use crate::parser::parse_tokens;
use crate::registry::Registry;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
}

/// Sha-224 content hash, hex encoded.
pub fn hash_text(text: &str) -> String {
    hex::encode(Sha224::digest(text.as_bytes()))
}

/// Metadata of a source file under render.
#[derive(Debug, Clone)]
pub struct RuntimeFile {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub size: u64,
    pub hash: String,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub locked: bool,
}

/// The result of one render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub text: String,
    /// Did the output differ from the input?
    pub changed: bool,
}

impl RenderOutcome {
    fn unchanged(text: String) -> Self {
        RenderOutcome {
            text,
            changed: false,
        }
    }
}

pub struct Runtime<'r> {
    cfg: Config,
    registry: &'r Registry,
    hooks: &'r HookRegistry,
    host: &'r dyn ExprHost,
    ctx: Params,
    nodes: Vec<Node>,
    hash: String,
    pub file: Option<RuntimeFile>,
    running: bool,
}

impl<'r> Runtime<'r> {
    /// Parse an in-memory text.
    pub fn from_text(
        text: &str,
        cfg: Config,
        registry: &'r Registry,
        hooks: &'r HookRegistry,
    ) -> Result<Self, RuntimeError> {
        Self::with_host(text, cfg, registry, hooks, &SimpleExpr)
    }

    pub fn with_host(
        text: &str,
        cfg: Config,
        registry: &'r Registry,
        hooks: &'r HookRegistry,
        host: &'r dyn ExprHost,
    ) -> Result<Self, RuntimeError> {
        cfg.validate()?;
        let tokens = Lexer::with_host(cfg, host).lex(text)?;
        Ok(Runtime {
            cfg,
            registry,
            hooks,
            host,
            ctx: Params::new(),
            nodes: parse_tokens(tokens, &cfg),
            hash: hash_text(text),
            file: None,
            running: false,
        })
    }

    /// Parse a file, feeding the lexer in chunks and hashing the stream.
    pub fn from_file(
        path: &Path,
        cfg: Config,
        registry: &'r Registry,
        hooks: &'r HookRegistry,
    ) -> Result<Self, RuntimeError> {
        cfg.validate()?;
        let meta = fs::metadata(path)?;

        let mut lexer = Lexer::new(cfg);
        let mut hasher = Sha224::new();
        let mut reader = fs::File::open(path)?;
        let mut buf = String::with_capacity(64 * 1024);
        reader.read_to_string(&mut buf)?;
        // Feed in chunks, respecting char boundaries
        let mut rest = buf.as_str();
        while !rest.is_empty() {
            let mut at = rest.len().min(8 * 1024);
            while !rest.is_char_boundary(at) {
                at += 1;
            }
            let (chunk, tail) = rest.split_at(at);
            hasher.update(chunk.as_bytes());
            lexer.push(chunk)?;
            rest = tail;
        }
        let tokens = lexer.finish()?;
        let hash = hex::encode(hasher.finalize());

        let file = RuntimeFile {
            path: path.to_path_buf(),
            dir: path.parent().unwrap_or(Path::new("")).to_path_buf(),
            size: meta.len(),
            hash: hash.clone(),
            ctime: DateTime::from(meta.created().or_else(|_| meta.modified())?),
            mtime: DateTime::from(meta.modified()?),
            locked: false,
        };
        Ok(Runtime {
            cfg,
            registry,
            hooks,
            host: &SimpleExpr,
            ctx: Params::new(),
            nodes: parse_tokens(tokens, &cfg),
            hash,
            file: Some(file),
            running: false,
        })
    }

    /// Seed the global context for render passes.
    pub fn set_context(&mut self, ctx: Params) {
        self.ctx = ctx;
    }

    pub fn context(&self) -> &Params {
        &self.ctx
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Does this source contain anything evaluable at all?
    pub fn has_tags(&self) -> bool {
        self.nodes.iter().any(|n| n.name.is_some())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// One render pass: evaluate a copy of the forest against a copy of the
    /// context, with a fresh per-pass cache.
    pub fn render(&mut self) -> RenderOutcome {
        if self.running {
            log::warn!("Render pass already running for {:?}", self.file);
            return RenderOutcome::unchanged(String::new());
        }
        self.running = true;

        let cache = Rc::new(RefCell::new(MemoCache::new()));
        let (root, fname) = match &self.file {
            Some(f) => (
                f.dir.to_string_lossy().into_owned(),
                f.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };
        let evaluator = Evaluator {
            registry: self.registry,
            hooks: self.hooks,
            cfg: self.cfg,
            host: self.host,
            cache: Rc::clone(&cache),
            root,
            fname,
        };

        let mut ctx = self.ctx.clone();
        let mut nodes = self.nodes.clone();
        evaluator.evaluate_all(&mut nodes, &mut ctx);
        let text = unparse_all(&nodes);
        let changed = hash_text(&text) != self.hash;

        // Pass over: nothing may outlive it in the cache
        cache.borrow_mut().clear();
        self.running = false;
        RenderOutcome { text, changed }
    }
}

/// Render one file, writing the output back only when it changed.
pub fn render_file(
    path: &Path,
    cfg: Config,
    registry: &Registry,
    hooks: &HookRegistry,
    ctx: Params,
    write: bool,
) -> Result<RenderOutcome, RuntimeError> {
    let mut rt = Runtime::from_file(path, cfg, registry, hooks)?;
    rt.set_context(ctx);
    if !rt.has_tags() {
        // Fast path: nothing to evaluate
        return Ok(RenderOutcome::unchanged(unparse_all(rt.nodes())));
    }
    let outcome = rt.render();
    if write && outcome.changed {
        fs::write(path, &outcome.text)?;
    }
    Ok(outcome)
}

/// How a directory render went.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DirOutcome {
    /// Files matched by the pattern
    pub found: usize,
    /// Files whose content changed
    pub rendered: usize,
}

/// Render every file under `dir` matching a glob pattern (e.g. `**/*.md`).
pub fn render_dir(
    dir: &Path,
    pattern: &str,
    cfg: Config,
    registry: &Registry,
    hooks: &HookRegistry,
    ctx: &Params,
    write: bool,
) -> Result<DirOutcome, RuntimeError> {
    let full = dir.join(pattern);
    let mut outcome = DirOutcome::default();
    for entry in glob::glob(&full.to_string_lossy())? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        outcome.found += 1;
        let one = render_file(&path, cfg, registry, hooks, ctx.clone(), write)?;
        if one.changed {
            outcome.rendered += 1;
        }
    }
    log::debug!(
        "Rendered {} of {} files under {:?}",
        outcome.rendered,
        outcome.found,
        dir
    );
    Ok(outcome)
}
