use crate::directives::SELECTOR_REWRITES;

/// Comment placed at the top of every compiled `<style>` element.
pub const STYLE_BANNER: &str = "/* Selectors may contain compiled mHTML directives. */";

/// Supplementary styling for compiled output: tooltip presentation and basic buttons.
pub const DEFAULT_STYLES: &str = "\
.fy-tooltip{position:relative;display:inline-block;width:fit-content;}\
.fy-tooltip-text{display:none;position:absolute;z-index:10;width:max-content;padding:8px;\
background:#363738;color:white;border-radius:0.15rem;cursor:default;}\
.fy-tooltip:hover .fy-tooltip-text{display:block;}\
.fy-pos-top{bottom:100%;left:0;margin-bottom:2px;}\
.fy-pos-bottom{top:100%;left:0;margin-top:2px;}\
.fy-pos-left{right:100%;top:0;margin-right:2px;}\
.fy-pos-right{left:100%;top:0;margin-left:2px;}\
button{background:#363738;padding:8px;border-radius:0.15rem;color:white;border:none;\
font-family:Calibri,'Trebuchet MS',sans-serif;font-weight:550;font-size:1.075em;}";

/// The default stylesheet text (without a `<style>` element).
pub fn default_styles() -> &'static str {
    DEFAULT_STYLES
}

/// Append the default stylesheet to compiled markup.
pub fn add_default_styles(html: &str) -> String {
    format!("{}<style>{}</style>", html, DEFAULT_STYLES)
}

/// Rewrite directive tag names used as selectors to the selectors of the
/// elements they compile to (`each` -> `div.fy-each`, ...).
///
/// The rewrite is textual: pairs are applied in order, each replacing the
/// first occurrence of the name as a substring in every `}`-delimited rule.
/// Substrings are not token-aware, so `li:first-child` becomes
/// `li:div.fy-first-child`, and a later pair may match inside an earlier
/// replacement (`esc` inside `div.fy-escape`).
pub fn rewrite_selectors(css: &str) -> String {
    SELECTOR_REWRITES
        .iter()
        .fold(css.to_string(), |css, (name, selector)| {
            replace_selector(&css, name, selector)
        })
}

/// Replace the first occurrence of `name` in each rule fragment with `replacement`.
pub fn replace_selector(css: &str, name: &str, replacement: &str) -> String {
    css.split('}')
        .map(|rule| rule.replacen(name, replacement, 1))
        .collect::<Vec<_>>()
        .join("}")
}
