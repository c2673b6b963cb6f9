//! # mHTML (magical HTML) compiler
//!
//! Compiles HTML-like markup containing directive tags (`if`, `each`,
//! `inter`, `tooltip`, ...) into plain markup for a browser.
//!
//! ## Features
//! - Conditionals, iteration and interpolation driven by a small expression language
//! - Stable `fy-*` marker classes on every compiled wrapper
//! - Selector rewriting inside `<style>` so directive names can be styled
//! - Per-node failure isolation: a bad node is skipped, the rest still compiles
//!
//! ## Example
//! ```ignore
//! use mhtml::{compile_with_scope, Scope};
//! use serde_json::json;
//!
//! let scope = Scope::new().with("items", json!(["a", "b"]));
//! let html = compile_with_scope(
//!     r#"<each of="items" as="x" index="i"><p>{i}: {x}</p></each>"#,
//!     &scope,
//!     false,
//! );
//! assert_eq!(html, r#"<div class="fy-each" data-items="2"><p>0: a</p><p>1: b</p></div>"#);
//! ```

pub mod compiler;
pub mod config;
pub mod directives;
pub mod error;
pub mod expr;
pub mod interpolate;
pub mod node;
pub mod parser;
pub mod style;

// --- Core types ---
pub use compiler::{CompileOutput, Compiler, Fragment, NodeFailure, BRANDING_COMMENT};
pub use config::CompilerConfig;
pub use directives::Directive;
pub use error::{EvalError, MhtmlError, MhtmlResult};
pub use expr::{ExprEngine, ExpressionEvaluator, Scope};
pub use node::{Attribute, Element, ParseNode};
pub use parser::{MarkupParser, TreeProvider};

// --- Free functions ---
pub use interpolate::interpolate;
pub use parser::parse_markup;
pub use style::{add_default_styles, default_styles, rewrite_selectors};

/// Compile markup with an empty scope and the provenance comment.
pub fn compile(markup: &str) -> String {
    Compiler::new().compile(markup, &Scope::new(), true)
}

/// Compile markup against an ambient scope.
pub fn compile_with_scope(markup: &str, scope: &Scope, branding: bool) -> String {
    Compiler::new().compile(markup, scope, branding)
}
