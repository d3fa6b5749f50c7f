//! Template compiler: lowers the directive tree into the render expression.
//!
//! The result is a single template literal. Interpolations become `${...}`
//! slots, `{#if}` chains become conditional expressions and loops become
//! `map(...).join("")` calls. Event, binding, class and style attributes
//! become `data-aspc-*` marker attributes that the runtime wires at mount.

use std::collections::BTreeSet;

use oxc_ast::ast::Expression;

use crate::diagnostic::{
    CompilerError, Locator, E_INVALID_BINDING, E_INVALID_JAVASCRIPT, E_UNKNOWN_DIRECTIVE,
    E_UNTERMINATED_EXPRESSION,
};
use crate::directives::{conditional_chain, loop_expression, Attribute, Node, SlotToken, TagToken};
use crate::js::{JsBuilder, TemplatePart};
use crate::rewrite::{rewrite_expression, Renames};
use crate::scan::find_matching;

pub struct TemplateContext<'c, 'a> {
    /// Names declared with `$state`, valid `#bind` targets.
    pub states: &'c BTreeSet<String>,
    pub loc: Locator<'c>,
    pub js: JsBuilder<'a>,
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

fn push_text(parts: &mut Vec<TemplatePart<'_>>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(TemplatePart::Text(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(TemplatePart::Text(text.to_string()));
    }
}

fn directive_value(attr: &Attribute) -> &str {
    attr.value.as_deref().unwrap_or("").trim()
}

impl<'c, 'a> TemplateContext<'c, 'a> {
    /// Rewrites `code` and parses it as a JavaScript expression.
    fn expression(&self, code: &str, renames: &Renames, offset: usize) -> Result<Expression<'a>, CompilerError> {
        let rewritten = rewrite_expression(code, renames);
        self.js.parse_expression(&rewritten).map_err(|err| {
            self.loc.error(
                E_INVALID_JAVASCRIPT,
                &format!("invalid expression `{}`: {}", code.trim(), err),
                offset,
            )
        })
    }

    fn push_expr(
        &self,
        parts: &mut Vec<TemplatePart<'a>>,
        code: &str,
        renames: &Renames,
        offset: usize,
    ) -> Result<(), CompilerError> {
        parts.push(TemplatePart::Expr(self.expression(code, renames, offset)?));
        Ok(())
    }

    /// Static attribute value that may contain `{expr}` interpolations.
    fn lower_attribute_value(
        &self,
        attr: &Attribute,
        value: &str,
        renames: &Renames,
        parts: &mut Vec<TemplatePart<'a>>,
    ) -> Result<(), CompilerError> {
        let mut copied = 0;
        let mut i = 0;
        while let Some(rel) = value[i..].find('{') {
            let open = i + rel;
            let close = find_matching(value, open).ok_or_else(|| {
                self.loc.error(
                    E_UNTERMINATED_EXPRESSION,
                    &format!("unterminated expression in attribute \"{}\"", attr.name),
                    attr.offset,
                )
            })?;
            let inner = value[open + 1..close].trim();
            if inner.is_empty() {
                i = close + 1;
                continue;
            }
            push_text(parts, &value[copied..open].replace('"', "&quot;"));
            self.push_expr(parts, inner, renames, attr.offset)?;
            copied = close + 1;
            i = close + 1;
        }
        push_text(parts, &value[copied..].replace('"', "&quot;"));
        Ok(())
    }

    fn lower_attribute(
        &self,
        attr: &Attribute,
        renames: &Renames,
        parts: &mut Vec<TemplatePart<'a>>,
    ) -> Result<(), CompilerError> {
        if let Some(event) = attr.name.strip_prefix('@') {
            let handler = rewrite_expression(directive_value(attr), renames);
            push_text(
                parts,
                &format!(" data-aspc-on-{}=\"{}\"", event, escape_attribute(&handler)),
            );
            return Ok(());
        }

        if let Some(directive) = attr.name.strip_prefix('#') {
            if directive != "bind" {
                return Err(self.loc.error(
                    E_UNKNOWN_DIRECTIVE,
                    &format!("unknown attribute directive #{}", directive),
                    attr.offset,
                ));
            }
            let target = directive_value(attr);
            // a loop binding of the same name shadows the state
            let is_state = self.states.contains(target)
                && renames.get(target) == Some(format!("{}.value", target).as_str());
            if !is_state {
                return Err(self.loc.error(
                    E_INVALID_BINDING,
                    &format!("#bind target \"{}\" is not a declared state", target),
                    attr.offset,
                ));
            }
            push_text(parts, &format!(" data-aspc-bind=\"{}\"", target));
            return Ok(());
        }

        if let Some(bound) = attr.name.strip_prefix(':') {
            match bound {
                "class" | "style" => {
                    let expression = rewrite_expression(directive_value(attr), renames);
                    push_text(
                        parts,
                        &format!(" data-aspc-{}=\"{}\"", bound, escape_attribute(&expression)),
                    );
                }
                _ => {
                    push_text(parts, &format!(" {}=\"", bound));
                    self.push_expr(parts, directive_value(attr), renames, attr.offset)?;
                    push_text(parts, "\"");
                }
            }
            return Ok(());
        }

        match &attr.value {
            None => push_text(parts, &format!(" {}", attr.name)),
            Some(value) if attr.braced => {
                push_text(parts, &format!(" {}=\"", attr.name));
                self.push_expr(parts, value, renames, attr.offset)?;
                push_text(parts, "\"");
            }
            Some(value) => {
                push_text(parts, &format!(" {}=\"", attr.name));
                self.lower_attribute_value(attr, value, renames, parts)?;
                push_text(parts, "\"");
            }
        }
        Ok(())
    }

    fn lower_tag(
        &self,
        tag: &TagToken,
        renames: &Renames,
        parts: &mut Vec<TemplatePart<'a>>,
    ) -> Result<(), CompilerError> {
        if tag.closing {
            push_text(parts, &format!("</{}>", tag.name));
            return Ok(());
        }
        push_text(parts, &format!("<{}", tag.name));
        for attr in &tag.attributes {
            self.lower_attribute(attr, renames, parts)?;
        }
        push_text(parts, if tag.self_closing { " />" } else { ">" });
        Ok(())
    }

    fn lower_slot(&self, slot: &SlotToken, renames: &Renames) -> Result<Expression<'a>, CompilerError> {
        let js = self.js;
        let name = slot
            .attribute("name")
            .and_then(|a| a.value.clone())
            .unwrap_or_else(|| "default".to_string());
        let mut scoped = Vec::new();
        for attr in &slot.attributes {
            let Some(prop) = attr.name.strip_prefix(':') else {
                continue;
            };
            let value = self.expression(directive_value(attr), renames, attr.offset)?;
            scoped.push(js.property(prop, value));
        }
        Ok(js.call(
            js.ident("renderSlot"),
            [js.string(&name), js.object(scoped), js.string(&slot.fallback)],
        ))
    }

    fn lower_nodes(
        &self,
        nodes: &[Node],
        renames: &Renames,
        parts: &mut Vec<TemplatePart<'a>>,
    ) -> Result<(), CompilerError> {
        for node in nodes {
            match node {
                Node::Text(text) => push_text(parts, text),
                Node::Interp { expression, offset } => self.push_expr(parts, expression, renames, *offset)?,
                Node::Tag { tag, .. } => self.lower_tag(tag, renames, parts)?,
                Node::Slot { slot, .. } => parts.push(TemplatePart::Expr(self.lower_slot(slot, renames)?)),
                Node::If { branches, otherwise } => {
                    let mut lowered = Vec::with_capacity(branches.len());
                    for branch in branches {
                        let test = self.expression(&branch.condition, renames, branch.offset)?;
                        lowered.push((test, self.lower_body(&branch.body, renames)?));
                    }
                    let otherwise = match otherwise {
                        Some(body) => Some(self.lower_body(body, renames)?),
                        None => None,
                    };
                    parts.push(TemplatePart::Expr(conditional_chain(self.js, lowered, otherwise)));
                }
                Node::Loop { header, body, offset } => {
                    let source = self.expression(&header.source, renames, *offset)?;
                    let inner = renames.without(header.bindings());
                    let key = match &header.key {
                        Some(key) => Some(self.expression(key, &inner, *offset)?),
                        None => None,
                    };
                    let mut body_parts = Vec::new();
                    self.lower_nodes(body, &inner, &mut body_parts)?;
                    parts.push(TemplatePart::Expr(loop_expression(
                        self.js,
                        header,
                        source,
                        key,
                        body_parts,
                    )));
                }
            }
        }
        Ok(())
    }

    fn lower_body(&self, nodes: &[Node], renames: &Renames) -> Result<Expression<'a>, CompilerError> {
        let mut parts = Vec::new();
        self.lower_nodes(nodes, renames, &mut parts)?;
        Ok(self.js.template(parts))
    }

    /// The render expression, wrapped in the scope element when the component
    /// has scoped styles.
    pub fn compile(
        &self,
        nodes: &[Node],
        renames: &Renames,
        scope_class: Option<&str>,
    ) -> Result<Expression<'a>, CompilerError> {
        let mut parts = Vec::new();
        if let Some(class) = scope_class {
            push_text(&mut parts, &format!("<div class=\"{}\">", class));
        }
        self.lower_nodes(nodes, renames, &mut parts)?;
        if scope_class.is_some() {
            push_text(&mut parts, "</div>");
        }
        Ok(self.js.template(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::{build_tree, tokenize, validate_blocks};
    use oxc_allocator::Allocator;

    fn render(template: &str, scope: Option<&str>) -> Result<String, CompilerError> {
        let loc = Locator::new("T.aspc", template, 0);
        let tokens = tokenize(template, &loc)?;
        validate_blocks(&tokens, &loc)?;
        let nodes = build_tree(tokens, &loc)?;
        let states: BTreeSet<String> = ["count".to_string(), "items".to_string()].into();
        let mut renames = Renames::new();
        renames.add_cell("count");
        renames.add_cell("items");
        renames.add_cell("doubled");
        renames.add_prop("title");
        let allocator = Allocator::default();
        let js = JsBuilder::new(&allocator);
        let ctx = TemplateContext { states: &states, loc, js };
        let expr = ctx.compile(&nodes, &renames, scope)?;
        Ok(js.print_expression(expr))
    }

    fn squashed(template: &str) -> String {
        render(template, None).unwrap().split_whitespace().collect()
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(
            render("<p>{count} / {doubled} - {title}</p>", None).unwrap(),
            "`<p>${count.value} / ${doubled.value} - ${props.title}</p>`"
        );
    }

    #[test]
    fn test_event_marker() {
        assert_eq!(
            render(r#"<button @click="count++">+</button>"#, None).unwrap(),
            "`<button data-aspc-on-click=\"count.value++\">+</button>`"
        );
    }

    #[test]
    fn test_bind_marker_and_invalid_target() {
        assert_eq!(
            render(r#"<input #bind="count" />"#, None).unwrap(),
            "`<input data-aspc-bind=\"count\" />`"
        );
        let err = render(r#"<input #bind="doubled" />"#, None).unwrap_err();
        assert_eq!(err.code, E_INVALID_BINDING);
        let err = render(r#"{#for count in items}<input #bind="count" />{/for}"#, None).unwrap_err();
        assert_eq!(err.code, E_INVALID_BINDING);
    }

    #[test]
    fn test_class_style_and_bound_attributes() {
        assert_eq!(
            render(r#"<div :class="{ on: count > 0 }" :title="title"></div>"#, None).unwrap(),
            "`<div data-aspc-class=\"{ on: count.value > 0 }\" title=\"${props.title}\"></div>`"
        );
    }

    #[test]
    fn test_static_attribute_interpolation() {
        assert_eq!(
            render(r#"<a href="/items/{count}" class='x "y"'>go</a>"#, None).unwrap(),
            "`<a href=\"/items/${count.value}\" class=\"x &quot;y&quot;\">go</a>`"
        );
    }

    #[test]
    fn test_unknown_attribute_directive() {
        assert_eq!(
            render(r#"<input #model="count" />"#, None).unwrap_err().code,
            E_UNKNOWN_DIRECTIVE
        );
    }

    #[test]
    fn test_invalid_expression_is_reported() {
        let err = render("<p>\n{count +}</p>", None).unwrap_err();
        assert_eq!(err.code, E_INVALID_JAVASCRIPT);
        assert_eq!(err.line, 2);
        assert!(err.message.contains("count +"));
        assert_eq!(
            render(r#"{#if count >}x{/if}"#, None).unwrap_err().code,
            E_INVALID_JAVASCRIPT
        );
    }

    #[test]
    fn test_slot_outlet() {
        let code = squashed(r#"<slot name="row" :item="count">empty</slot>"#);
        assert_eq!(code, "`${renderSlot(\"row\",{item:count.value},\"empty\")}`");
    }

    #[test]
    fn test_loop_shadows_reactive_names() {
        let code = squashed("{#for count in items}<i>{count}</i>{/for}");
        assert!(code.starts_with("`${items.value.map("));
        assert!(code.ends_with("=>`<i>${count}</i>`).join(\"\")}`"));
        assert!(!code.contains("count.value"));
    }

    #[test]
    fn test_if_chain() {
        let code = squashed("{#if count > 1}many{:else if count}one{:else}none{/if}");
        assert!(code.contains("count.value>1?`many`:count.value?`one`:`none`"));
    }

    #[test]
    fn test_scope_wrapper() {
        assert_eq!(
            render("<p>x</p>", Some("aspc-card")).unwrap(),
            "`<div class=\"aspc-card\"><p>x</p></div>`"
        );
    }
}
