use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::CompilerConfig;
use crate::directives::{self, Directive};
use crate::error::{MhtmlError, MhtmlResult};
use crate::expr::value::{truthy, type_name};
use crate::expr::{ExprEngine, ExpressionEvaluator, Scope};
use crate::interpolate::interpolate;
use crate::node::{attributes_markup, is_void_element, Attribute, Element, ParseNode};
use crate::parser::{MarkupParser, TreeProvider};
use crate::style::{rewrite_selectors, STYLE_BANNER};

/// Provenance comment prepended to branded output.
pub const BRANDING_COMMENT: &str = "<!-- Compiled mHTML (magical HTML) by mhtml -->";

pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Result of compiling one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Markup(String),
    /// A `halt` node: stop collecting siblings at this level.
    Halt,
}

impl Fragment {
    fn empty() -> Self {
        Fragment::Markup(String::new())
    }
}

/// A top-level node that failed to compile and was left out of the output.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    /// Position among the top-level nodes.
    pub index: usize,
    pub error: MhtmlError,
}

/// Output of a compile pass together with what was dropped along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOutput {
    pub html: String,
    pub failures: Vec<NodeFailure>,
    /// True when a top-level `halt` cut the document short.
    pub halted: bool,
}

/// Compiles mHTML markup into plain markup.
pub struct Compiler {
    evaluator: Box<dyn ExpressionEvaluator>,
    provider: Box<dyn TreeProvider>,
    max_depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            evaluator: Box::new(ExprEngine),
            provider: Box::new(MarkupParser),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new().with_max_depth(config.max_depth)
    }

    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn with_provider(mut self, provider: impl TreeProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Compile `markup` against the ambient `scope`. Never fails: nodes that
    /// cannot be compiled are logged and skipped.
    pub fn compile(&self, markup: &str, scope: &Scope, branding: bool) -> String {
        self.compile_report(markup, scope, branding).html
    }

    /// Like [`Compiler::compile`], but also reports skipped nodes.
    pub fn compile_report(&self, markup: &str, scope: &Scope, branding: bool) -> CompileOutput {
        let mut report = CompileOutput::default();

        let nodes = match self.provider.parse(markup.trim()) {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "mHTML compiler: could not parse markup");
                report.failures.push(NodeFailure { index: 0, error: e });
                report.html = brand(String::new(), branding);
                return report;
            }
        };

        let mut body = String::new();
        for (index, node) in nodes.iter().enumerate() {
            match self.compile_node(node, scope) {
                Ok(Fragment::Markup(markup)) => body.push_str(&markup),
                Ok(Fragment::Halt) => {
                    debug!(index, "halt reached, remaining top-level nodes skipped");
                    report.halted = true;
                    break;
                }
                Err(e) => {
                    error!(index, error = %e, "mHTML compiler: node skipped");
                    debug!(index, node = %node.outer_markup(), "skipped node source");
                    report.failures.push(NodeFailure { index, error: e });
                }
            }
        }

        report.html = brand(body.trim().to_string(), branding);
        report
    }

    /// Compile a single node and its descendants.
    pub fn compile_node(&self, node: &ParseNode, scope: &Scope) -> MhtmlResult<Fragment> {
        self.compile_at(node, scope, 0)
    }

    fn compile_at(&self, node: &ParseNode, scope: &Scope, depth: usize) -> MhtmlResult<Fragment> {
        if depth > self.max_depth {
            return Err(MhtmlError::MaxNestingDepthExceeded {
                max_depth: self.max_depth,
            });
        }
        match node {
            ParseNode::Text(text) => Ok(Fragment::Markup(text.clone())),
            ParseNode::Comment(_) => Ok(Fragment::empty()),
            ParseNode::Element(el) => self.compile_element(el, scope, depth),
        }
    }

    fn compile_element(&self, el: &Element, scope: &Scope, depth: usize) -> MhtmlResult<Fragment> {
        let tag = el.tag_name.to_lowercase();
        let Some(directive) = Directive::from_tag(&tag) else {
            return self.passthrough(el, &tag, scope, depth);
        };

        match directive {
            Directive::Halt => Ok(Fragment::Halt),
            Directive::Escape => Ok(Fragment::Markup(wrap(
                directives::ESCAPE_CLASS,
                &el.inner_markup(),
            ))),
            Directive::Style => Ok(Fragment::Markup(format!(
                "<style>{} {}</style>",
                STYLE_BANNER,
                rewrite_selectors(&el.text_content()).trim()
            ))),
            Directive::First => self.compile_wrapper(
                Element::with_class(
                    directives::WRAPPER_TAG,
                    directives::FIRST_CLASS,
                    el.children.clone(),
                ),
                scope,
                depth,
            ),
            Directive::Last => {
                warn!("mHTML compiler: <last> is not supported yet; emitting an empty placeholder");
                Ok(Fragment::Markup(wrap(directives::LAST_CLASS, "")))
            }
            Directive::Await => {
                warn!("mHTML compiler: <await> is not supported yet; emitting an empty placeholder");
                Ok(Fragment::Markup(wrap(directives::AWAIT_CLASS, "")))
            }
            Directive::Group if el.has_class("group") => Ok(Fragment::Markup(wrap(
                directives::GROUP_CLASS,
                &el.inner_markup(),
            ))),
            Directive::If => self.compile_if(el, scope, depth),
            Directive::Else => Ok(Fragment::empty()),
            Directive::Inter => self.compile_inter(el, scope, depth),
            Directive::Each if el.has_attribute("of") => self.compile_each(el, scope, depth),
            Directive::Tooltip => self.compile_tooltip(el, scope, depth),
            Directive::Group | Directive::Each => self.passthrough(el, &tag, scope, depth),
        }
    }

    /// Plain element: table lookup for the tag, attributes verbatim, children compiled.
    fn passthrough(
        &self,
        el: &Element,
        tag: &str,
        scope: &Scope,
        depth: usize,
    ) -> MhtmlResult<Fragment> {
        let out_tag = directives::output_tag(tag).unwrap_or(el.tag_name.as_str());
        let attrs = attributes_markup(&el.attributes);
        if is_void_element(out_tag) {
            return Ok(Fragment::Markup(format!("<{}{}>", out_tag, attrs)));
        }
        let children = self.compile_children(&el.children, scope, depth)?;
        Ok(Fragment::Markup(format!(
            "<{0}{1}>{2}</{0}>",
            out_tag, attrs, children
        )))
    }

    /// Compile siblings in order, stopping at a `halt`.
    fn compile_children(
        &self,
        children: &[ParseNode],
        scope: &Scope,
        depth: usize,
    ) -> MhtmlResult<String> {
        let mut out = String::new();
        for child in children {
            match self.compile_at(child, scope, depth + 1)? {
                Fragment::Markup(markup) => out.push_str(&markup),
                Fragment::Halt => break,
            }
        }
        Ok(out)
    }

    /// Compile a synthetic wrapper element as a nested pass. The wrapper stands
    /// in for the directive node, so it sits at the directive's depth.
    fn compile_wrapper(
        &self,
        wrapper: Element,
        scope: &Scope,
        depth: usize,
    ) -> MhtmlResult<Fragment> {
        let tag = wrapper.tag_name.to_lowercase();
        self.passthrough(&wrapper, &tag, scope, depth)
    }

    fn compile_if(&self, el: &Element, scope: &Scope, depth: usize) -> MhtmlResult<Fragment> {
        let condition = match el.attribute("c").map(str::trim) {
            Some(source) if !source.is_empty() => {
                truthy(&self.evaluate(Directive::If, "c", source, scope)?)
            }
            _ => false,
        };

        // The consequent is compiled whatever the condition, so a broken
        // consequent fails the node even when the alternative is chosen.
        let consequent = self.compile_children(&el.children, scope, depth)?;
        if condition {
            return Ok(Fragment::Markup(wrap(directives::IF_CLASS, &consequent)));
        }

        let alternative = el
            .element_children()
            .find(|child| child.tag_name.eq_ignore_ascii_case("else"))
            .map(|else_el| else_el.children.clone())
            .unwrap_or_default();
        self.compile_wrapper(
            Element::with_class(directives::WRAPPER_TAG, directives::ELSE_CLASS, alternative),
            scope,
            depth,
        )
    }

    fn compile_inter(&self, el: &Element, scope: &Scope, depth: usize) -> MhtmlResult<Fragment> {
        let bindings = match el.attribute("vars").map(str::trim) {
            Some(source) if !source.is_empty() => {
                let value = self.evaluate(Directive::Inter, "vars", source, scope)?;
                let kind = type_name(&value);
                Scope::from_value(value).ok_or_else(|| MhtmlError::InvalidDirective {
                    directive: Directive::Inter.name().to_string(),
                    reason: format!("'vars' must evaluate to an object, got {}", kind),
                })?
            }
            _ => Scope::new(),
        };
        let inner_scope = scope.extended(bindings);

        let markup = interpolate(&el.inner_markup(), &inner_scope, self.evaluator.as_ref())
            .map_err(|source| MhtmlError::Interpolation {
                directive: Directive::Inter.name().to_string(),
                source,
            })?;
        let children = self.provider.parse(&markup)?;

        self.compile_wrapper(
            Element::with_class(directives::WRAPPER_TAG, directives::INTER_CLASS, children),
            scope,
            depth,
        )
    }

    fn compile_each(&self, el: &Element, scope: &Scope, depth: usize) -> MhtmlResult<Fragment> {
        let source = el.attribute("of").unwrap_or_default();
        let items = match self.evaluate(Directive::Each, "of", source, scope)? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(MhtmlError::InvalidDirective {
                    directive: Directive::Each.name().to_string(),
                    reason: format!(
                        "'of' must evaluate to an array, got {}",
                        type_name(&other)
                    ),
                })
            }
        };
        let item_name = el.attribute("as").unwrap_or_default();
        let index_name = el.attribute("index").unwrap_or_default();

        // Children see the ambient scope only; iteration bindings are applied
        // to the compiled text.
        let compiled = self.compile_children(&el.children, scope, depth)?;
        let mut content = String::new();
        for (index, item) in items.iter().enumerate() {
            let mut bindings = Vec::with_capacity(2);
            if !item_name.is_empty() {
                bindings.push((item_name.to_string(), item.clone()));
            }
            if !index_name.is_empty() {
                bindings.push((index_name.to_string(), Value::from(index)));
            }
            let iteration_scope = scope.extended(bindings);
            let rendered = interpolate(&compiled, &iteration_scope, self.evaluator.as_ref())
                .map_err(|source| MhtmlError::Interpolation {
                    directive: Directive::Each.name().to_string(),
                    source,
                })?;
            content.push_str(&rendered);
        }

        // Interpolated values may themselves carry directives.
        let children = self.provider.parse(&content)?;
        let wrapper = Element::new(
            directives::WRAPPER_TAG,
            vec![
                Attribute::new("class", directives::EACH_CLASS),
                Attribute::new(directives::EACH_COUNT_ATTRIBUTE, items.len().to_string()),
            ],
            children,
        );
        self.compile_wrapper(wrapper, scope, depth)
    }

    fn compile_tooltip(&self, el: &Element, scope: &Scope, depth: usize) -> MhtmlResult<Fragment> {
        let text = el.attribute("text").unwrap_or_default();
        let position = el
            .attribute("ps")
            .filter(|p| !p.is_empty())
            .unwrap_or(directives::DEFAULT_TOOLTIP_POSITION);

        let label = Element::with_class(
            directives::TOOLTIP_TAG,
            format!(
                "{} {}{}",
                directives::TOOLTIP_TEXT_CLASS,
                directives::TOOLTIP_POSITION_PREFIX,
                position
            ),
            vec![ParseNode::text(text)],
        );
        let mut children = Vec::with_capacity(el.children.len() + 1);
        children.push(ParseNode::Element(label));
        children.extend(el.children.iter().cloned());

        self.compile_wrapper(
            Element::with_class(directives::TOOLTIP_TAG, directives::TOOLTIP_CLASS, children),
            scope,
            depth,
        )
    }

    fn evaluate(
        &self,
        directive: Directive,
        attribute: &str,
        source: &str,
        scope: &Scope,
    ) -> MhtmlResult<Value> {
        self.evaluator
            .evaluate(source, scope)
            .map_err(|source| MhtmlError::Expression {
                directive: directive.name().to_string(),
                attribute: attribute.to_string(),
                source,
            })
    }
}

/// `<div class="...">inner</div>` with `inner` taken verbatim.
fn wrap(class: &str, inner: &str) -> String {
    format!(
        "<{0} class=\"{1}\">{2}</{0}>",
        directives::WRAPPER_TAG,
        class,
        inner
    )
}

fn brand(body: String, branding: bool) -> String {
    if branding {
        format!("{}{}", BRANDING_COMMENT, body)
    } else {
        body
    }
}
