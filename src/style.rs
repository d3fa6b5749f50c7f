//! Style compiler: SCSS-lite pre-pass and selector scoping.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

use crate::diagnostic::{
    CompilerError, Locator, E_UNBALANCED_STYLE, E_UNDEFINED_STYLE_VARIABLE,
    E_UNTERMINATED_STYLE_COMMENT,
};
use crate::scan::split_top_level;

lazy_static! {
    static ref VAR_DEF_RE: Regex = Regex::new(r"(?m)^[ \t]*\$([\w-]+)[ \t]*:[ \t]*([^;{}]+);").unwrap();
    static ref VAR_REF_RE: Regex = Regex::new(r"#\{\s*\$([\w-]+)\s*\}|\$([\w-]+)").unwrap();
}

/// At-rules whose bodies hold ordinary style rules.
const SCOPED_AT_RULES: &[&str] = &["@media", "@supports", "@layer", "@container"];

pub fn scope_class(component_name: &str) -> String {
    format!("aspc-{}", component_name.to_lowercase())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PASS
// ═══════════════════════════════════════════════════════════════════════════════

fn blank(bytes: &mut [u8]) {
    for b in bytes {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

fn skip_quoted(bytes: &[u8], i: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

/// Replaces comments with spaces so byte offsets survive. `//` line comments
/// are only recognised in SCSS, and only after whitespace or a delimiter so
/// `url(http://...)` is left alone.
fn strip_comments(css: &str, scss: bool, loc: &Locator) -> Result<String, CompilerError> {
    let bytes = css.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => i = skip_quoted(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = css[i + 2..].find("*/").map(|e| i + 2 + e + 2).ok_or_else(|| {
                    loc.error(E_UNTERMINATED_STYLE_COMMENT, "unterminated comment", i)
                })?;
                blank(&mut out[i..end]);
                i = end;
            }
            b'/' if scss
                && bytes.get(i + 1) == Some(&b'/')
                && (i == 0 || matches!(bytes[i - 1], b' ' | b'\t' | b'\n' | b'\r' | b';' | b'{' | b'}')) =>
            {
                let end = css[i..].find('\n').map(|e| i + e).unwrap_or(bytes.len());
                blank(&mut out[i..end]);
                i = end;
            }
            _ => i += 1,
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn check_balance(css: &str, loc: &Locator) -> Result<(), CompilerError> {
    let bytes = css.as_bytes();
    let mut open: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'{' => open.push(i),
            b'}' => {
                if open.pop().is_none() {
                    return Err(loc.error(E_UNBALANCED_STYLE, "unexpected } in stylesheet", i));
                }
            }
            _ => {}
        }
        i += 1;
    }
    match open.last() {
        Some(&offset) => Err(loc.error(E_UNBALANCED_STYLE, "unclosed { in stylesheet", offset)),
        None => Ok(()),
    }
}

fn resolve_variables(
    text: &str,
    vars: &BTreeMap<String, String>,
    loc: &Locator,
    base: usize,
) -> Result<String, CompilerError> {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for caps in VAR_REF_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
        let value = vars.get(name).ok_or_else(|| {
            loc.error(
                E_UNDEFINED_STYLE_VARIABLE,
                &format!("undefined variable ${}", name),
                base + whole.start(),
            )
        })?;
        out.push_str(&text[copied..whole.start()]);
        out.push_str(value);
        copied = whole.end();
    }
    out.push_str(&text[copied..]);
    Ok(out)
}

/// Collects `$var: value;` definitions, removes them and substitutes every
/// `$var` / `#{$var}` reference.
fn substitute_variables(css: &str, loc: &Locator) -> Result<String, CompilerError> {
    let mut vars = BTreeMap::new();
    let mut blanked = css.as_bytes().to_vec();
    for caps in VAR_DEF_RE.captures_iter(css) {
        let whole = caps.get(0).unwrap();
        let value_match = caps.get(2).unwrap();
        let value = resolve_variables(value_match.as_str().trim(), &vars, loc, value_match.start())?;
        vars.insert(caps[1].to_string(), value);
        blank(&mut blanked[whole.start()..whole.end()]);
    }
    let text = String::from_utf8_lossy(&blanked).into_owned();
    resolve_variables(&text, &vars, loc, 0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULE TREE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Item {
    /// Declaration or body-less at-rule.
    Statement(String),
    Block { prelude: String, body: Vec<Item> },
}

fn matching_brace(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses balanced CSS into statements and blocks.
fn parse_items(css: &str) -> Vec<Item> {
    let bytes = css.as_bytes();
    let mut items = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b';' => {
                let statement = css[start..i].trim();
                if !statement.is_empty() {
                    items.push(Item::Statement(statement.to_string()));
                }
                start = i + 1;
            }
            b'{' => {
                let close = matching_brace(bytes, i);
                let body_end = close.min(bytes.len());
                items.push(Item::Block {
                    prelude: normalize(&css[start..i]),
                    body: parse_items(&css[i + 1..body_end]),
                });
                i = close;
                start = close + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if let Some(rest) = css.get(start..) {
        let rest = rest.trim();
        if !rest.is_empty() {
            items.push(Item::Statement(rest.to_string()));
        }
    }
    items
}

fn selectors(prelude: &str) -> Vec<String> {
    split_top_level(prelude, b',')
        .into_iter()
        .map(normalize)
        .filter(|s| !s.is_empty())
        .collect()
}

fn combine(parent: &str, child: &str) -> String {
    if child.contains('&') {
        child.replace('&', parent)
    } else {
        format!("{} {}", parent, child)
    }
}

fn flatten_rule(parents: &[String], body: Vec<Item>, out: &mut Vec<Item>) {
    let mut own = Vec::new();
    let mut nested = Vec::new();
    for item in body {
        match item {
            Item::Statement(_) => own.push(item),
            Item::Block { prelude, body } if prelude.starts_with('@') => {
                let mut inner = Vec::new();
                flatten_rule(parents, body, &mut inner);
                nested.push(Item::Block { prelude, body: inner });
            }
            Item::Block { prelude, body } => {
                let combined: Vec<String> = parents
                    .iter()
                    .flat_map(|p| selectors(&prelude).into_iter().map(move |c| combine(p, &c)))
                    .collect();
                flatten_rule(&combined, body, &mut nested);
            }
        }
    }
    if !own.is_empty() {
        out.push(Item::Block {
            prelude: parents.join(", "),
            body: own,
        });
    }
    out.extend(nested);
}

/// Flattens `&` and descendant nesting into top-level rules.
fn flatten(items: Vec<Item>) -> Vec<Item> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Item::Block { prelude, body } if is_scoped_at_rule(&prelude) => out.push(Item::Block {
                prelude,
                body: flatten(body),
            }),
            Item::Block { prelude, body } if !prelude.starts_with('@') => {
                flatten_rule(&selectors(&prelude), body, &mut out);
            }
            other => out.push(other),
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPING
// ═══════════════════════════════════════════════════════════════════════════════

fn is_scoped_at_rule(prelude: &str) -> bool {
    let name = prelude.split_whitespace().next().unwrap_or("");
    SCOPED_AT_RULES.iter().any(|r| name.eq_ignore_ascii_case(r))
}

/// `:root`, `html`, `body` and `*` selectors stay global.
fn is_global_selector(selector: &str) -> bool {
    let first = selector
        .split(|c: char| c.is_whitespace() || matches!(c, '>' | '+' | '~'))
        .next()
        .unwrap_or("");
    if first.starts_with(":root") {
        return true;
    }
    let base = first
        .split(|c: char| matches!(c, '.' | '#' | '[' | ':'))
        .next()
        .unwrap_or("");
    matches!(base.to_ascii_lowercase().as_str(), "html" | "body" | "*")
}

fn scope(items: Vec<Item>, class: &str) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| match item {
            Item::Block { prelude, body } if prelude.starts_with('@') => {
                if is_scoped_at_rule(&prelude) {
                    Item::Block {
                        prelude,
                        body: scope(body, class),
                    }
                } else {
                    Item::Block { prelude, body }
                }
            }
            Item::Block { prelude, body } => {
                let scoped: Vec<String> = selectors(&prelude)
                    .into_iter()
                    .map(|s| {
                        if is_global_selector(&s) {
                            s
                        } else {
                            format!(".{} {}", class, s)
                        }
                    })
                    .collect();
                Item::Block {
                    prelude: scoped.join(", "),
                    body,
                }
            }
            statement => statement,
        })
        .collect()
}

fn print_items(items: &[Item], indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    for item in items {
        match item {
            Item::Statement(text) => {
                out.push_str(&pad);
                out.push_str(text);
                out.push_str(";\n");
            }
            Item::Block { prelude, body } => {
                out.push_str(&pad);
                out.push_str(prelude);
                out.push_str(" {\n");
                print_items(body, indent + 1, out);
                out.push_str(&pad);
                out.push_str("}\n");
            }
        }
    }
}

/// Compile a style section to scoped CSS. `lang` selects the SCSS pre-pass.
pub fn compile_style(
    css: &str,
    lang: Option<&str>,
    class: &str,
    loc: &Locator,
) -> Result<String, CompilerError> {
    let scss = matches!(lang, Some("scss") | Some("sass"));
    let css = strip_comments(css, scss, loc)?;
    check_balance(&css, loc)?;

    let mut items = if scss {
        parse_items(&substitute_variables(&css, loc)?)
    } else {
        parse_items(&css)
    };
    if scss {
        items = flatten(items);
    }

    let mut out = String::new();
    print_items(&scope(items, class), 0, &mut out);
    log::debug!("[aspc] scoped stylesheet for .{} ({} bytes)", class, out.len());
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::ErrorKind;

    fn css(src: &str, lang: Option<&str>) -> Result<String, CompilerError> {
        let loc = Locator::new("Card.aspc", src, 0);
        compile_style(src, lang, "aspc-card", &loc)
    }

    #[test]
    fn test_scopes_every_selector() {
        assert_eq!(
            css("h1, h2 > a { color: red }", None).unwrap(),
            ".aspc-card h1, .aspc-card h2 > a {\n  color: red;\n}"
        );
    }

    #[test]
    fn test_global_selectors_untouched() {
        let out = css(":root { --x: 1; } html, body { margin: 0; } * { box-sizing: border-box; }", None).unwrap();
        assert!(out.starts_with(":root {"));
        assert!(out.contains("html, body {"));
        assert!(out.contains("* {"));
        assert!(!out.contains(".aspc-card"));
    }

    #[test]
    fn test_media_rules_scoped_keyframes_kept() {
        let out = css(
            "@media (max-width: 600px) { p { color: blue; } }\n@keyframes spin { from { opacity: 0; } to { opacity: 1; } }",
            None,
        )
        .unwrap();
        assert!(out.contains("@media (max-width: 600px) {\n  .aspc-card p {\n    color: blue;\n  }\n}"));
        assert!(out.contains("@keyframes spin {\n  from {\n    opacity: 0;\n  }"));
    }

    #[test]
    fn test_url_is_not_a_comment() {
        let out = css(".a { background: url(http://x.test/a.png); }", Some("scss")).unwrap();
        assert!(out.contains("url(http://x.test/a.png)"));
    }

    #[test]
    fn test_scss_variables_and_nesting() {
        let src = "// theme\n$primary: #333;\n$accent: $primary;\n.card {\n  color: $primary;\n  &:hover { color: $accent; }\n  .title { font-weight: bold; }\n}";
        assert_eq!(
            css(src, Some("scss")).unwrap(),
            ".aspc-card .card {\n  color: #333;\n}\n.aspc-card .card:hover {\n  color: #333;\n}\n.aspc-card .card .title {\n  font-weight: bold;\n}"
        );
    }

    #[test]
    fn test_plain_css_keeps_dollar_text() {
        assert!(css(".a { content: \"$x\"; }", None).unwrap().contains("\"$x\""));
    }

    #[test]
    fn test_undefined_variable() {
        let err = css(".a {\n  color: $missing;\n}", Some("scss")).unwrap_err();
        assert_eq!(err.code, E_UNDEFINED_STYLE_VARIABLE);
        assert_eq!(err.kind, ErrorKind::Style);
        assert_eq!((err.line, err.column), (2, 10));
    }

    #[test]
    fn test_unbalanced_braces() {
        assert_eq!(css(".a { color: red;", None).unwrap_err().code, E_UNBALANCED_STYLE);
        assert_eq!(css(".a { } }", None).unwrap_err().code, E_UNBALANCED_STYLE);
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            css(".a { } /* open", None).unwrap_err().code,
            E_UNTERMINATED_STYLE_COMMENT
        );
    }
}
