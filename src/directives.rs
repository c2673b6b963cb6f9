//! Static directive configuration: the tag table, marker classes and the
//! selector rewrite list. All of it is read-only process data.

pub const ESCAPE_CLASS: &str = "fy-escape";
pub const FIRST_CLASS: &str = "fy-first";
pub const LAST_CLASS: &str = "fy-last";
pub const AWAIT_CLASS: &str = "fy-await";
pub const GROUP_CLASS: &str = "fy-group";
pub const IF_CLASS: &str = "fy-if";
pub const ELSE_CLASS: &str = "fy-else";
pub const INTER_CLASS: &str = "fy-inter";
pub const EACH_CLASS: &str = "fy-each";
pub const TOOLTIP_CLASS: &str = "fy-tooltip";
pub const TOOLTIP_TEXT_CLASS: &str = "fy-tooltip-text";
/// Prefix of the tooltip position modifier, e.g. `fy-pos-top`.
pub const TOOLTIP_POSITION_PREFIX: &str = "fy-pos-";
/// Data attribute carrying the iteration count of an `each` wrapper.
pub const EACH_COUNT_ATTRIBUTE: &str = "data-items";
pub const DEFAULT_TOOLTIP_POSITION: &str = "top";

/// Tag emitted for directive wrappers.
pub const WRAPPER_TAG: &str = "div";
pub const TOOLTIP_TAG: &str = "span";

/// Reserved tag name -> plain output tag, used when no rewrite rule applies.
pub const DIRECTIVE_TABLE: &[(&str, &str)] = &[
    ("btn", "button"),
    ("vid", "video"),
    ("group", "div"),
    ("if", "div"),
    ("else", "div"),
    ("each", "div"),
    ("inter", "div"),
    ("first", "div"),
    ("last", "div"),
    ("await", "div"),
    ("bq", "blockquote"),
];

/// Directive name -> compiled selector, applied in this order.
pub const SELECTOR_REWRITES: &[(&str, &str)] = &[
    ("escape", "div.fy-escape"),
    ("esc", "div.fy-escape"),
    ("first", "div.fy-first"),
    ("last", "div.fy-last"),
    ("await", "div.fy-await"),
    ("group", "div.fy-group"),
    ("if", "div.fy-if"),
    ("else", "div.fy-else"),
    ("inter", "div.fy-inter"),
    ("each", "div.fy-each"),
    ("tooltip", "span.fy-tooltip"),
];

/// Output tag for a lower-cased tag name, if the table maps it.
pub fn output_tag(tag: &str) -> Option<&'static str> {
    DIRECTIVE_TABLE
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, out)| *out)
}

/// Tags with their own rewrite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Halt,
    Escape,
    Style,
    First,
    Last,
    Await,
    Group,
    If,
    Else,
    Inter,
    Each,
    Tooltip,
}

impl Directive {
    /// Identify a directive by its lower-cased tag name.
    ///
    /// `Group` and `Each` only take effect when their attribute precondition
    /// holds; the compiler falls back to plain passthrough otherwise.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let directive = match tag {
            "halt" => Directive::Halt,
            "escape" | "esc" => Directive::Escape,
            "style" => Directive::Style,
            "first" => Directive::First,
            "last" => Directive::Last,
            "await" => Directive::Await,
            "group" => Directive::Group,
            "if" => Directive::If,
            "else" => Directive::Else,
            "inter" => Directive::Inter,
            "each" => Directive::Each,
            "tooltip" => Directive::Tooltip,
            _ => return None,
        };
        Some(directive)
    }

    pub fn name(self) -> &'static str {
        match self {
            Directive::Halt => "halt",
            Directive::Escape => "escape",
            Directive::Style => "style",
            Directive::First => "first",
            Directive::Last => "last",
            Directive::Await => "await",
            Directive::Group => "group",
            Directive::If => "if",
            Directive::Else => "else",
            Directive::Inter => "inter",
            Directive::Each => "each",
            Directive::Tooltip => "tooltip",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookup() {
        assert_eq!(output_tag("btn"), Some("button"));
        assert_eq!(output_tag("bq"), Some("blockquote"));
        assert_eq!(output_tag("section"), None);
    }

    #[test]
    fn directive_aliases() {
        assert_eq!(Directive::from_tag("esc"), Some(Directive::Escape));
        assert_eq!(Directive::from_tag("escape"), Some(Directive::Escape));
        assert_eq!(Directive::from_tag("btn"), None);
    }
}
