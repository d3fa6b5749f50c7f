//! Code generators: descriptor in, AST fragment out.

use oxc_ast::ast::{Expression, MemberExpression, Statement};
use oxc_syntax::operator::BinaryOperator;

use crate::component::{PropDescriptor, PropType};
use crate::diagnostic::{E_INVALID_PROP_TYPE, E_MISSING_REQUIRED_PROP, E_UNDECLARED_EVENT};
use crate::js::{JsBuilder, TemplatePart};

fn prop_target<'a>(js: JsBuilder<'a>, name: &str) -> MemberExpression<'a> {
    js.member_or_index(js.ident("props"), name)
}

fn prop_access<'a>(js: JsBuilder<'a>, name: &str) -> Expression<'a> {
    Expression::from(prop_target(js, name))
}

fn is_array<'a>(js: JsBuilder<'a>, value: Expression<'a>) -> Expression<'a> {
    js.method(js.ident("Array"), "isArray", [value])
}

/// Expression that is true when `props[name]` does not have type `ty`.
fn type_mismatch<'a>(js: JsBuilder<'a>, name: &str, ty: PropType) -> Option<Expression<'a>> {
    let value = || prop_access(js, name);
    let typeof_is_not = |type_name: &str| js.strict_not_equal(js.type_of(value()), js.string(type_name));
    Some(match ty {
        PropType::String => typeof_is_not("string"),
        PropType::Number => typeof_is_not("number"),
        PropType::Boolean => typeof_is_not("boolean"),
        PropType::Array => js.not(is_array(js, value())),
        PropType::Object => js.or(
            js.or(typeof_is_not("object"), js.strict_equal(value(), js.null())),
            is_array(js, value()),
        ),
        PropType::Any => return None,
    })
}

/// `"array"`, `"null"` or the `typeof` of `props[name]`.
fn actual_type<'a>(js: JsBuilder<'a>, name: &str) -> Expression<'a> {
    js.conditional(
        is_array(js, prop_access(js, name)),
        js.string("array"),
        js.conditional(
            js.strict_equal(prop_access(js, name), js.null()),
            js.string("null"),
            js.type_of(prop_access(js, name)),
        ),
    )
}

fn push_error<'a>(js: JsBuilder<'a>, message: Expression<'a>) -> Statement<'a> {
    js.expr_stmt(js.method(js.ident("errors"), "push", [message]))
}

/// Module-level `export function validateProps(props)`. Collects every
/// problem, warns once with the joined list and returns it (or `null`).
pub fn props_validation<'a>(js: JsBuilder<'a>, props: &[PropDescriptor]) -> Statement<'a> {
    let mut body = vec![js.const_decl("errors", js.array([]))];

    for prop in props {
        if prop.required {
            let message = format!(
                "[E{}] Missing required prop \"{}\"",
                E_MISSING_REQUIRED_PROP, prop.name
            );
            body.push(js.if_then(
                js.strict_equal(prop_access(js, &prop.name), js.undefined()),
                [push_error(js, js.string(&message))],
            ));
        }
        if let Some(mismatch) = type_mismatch(js, &prop.name, prop.prop_type) {
            let prefix = format!(
                "[E{}] Invalid prop \"{}\": expected {}, got ",
                E_INVALID_PROP_TYPE,
                prop.name,
                prop.prop_type.as_str()
            );
            let message = js.binary(js.string(&prefix), BinaryOperator::Addition, actual_type(js, &prop.name));
            body.push(js.if_then(
                js.and(
                    js.strict_not_equal(prop_access(js, &prop.name), js.undefined()),
                    mismatch,
                ),
                [push_error(js, message)],
            ));
        }
    }

    let has_errors = js.binary(
        js.member(js.ident("errors"), "length"),
        BinaryOperator::GreaterThan,
        js.number(0.0),
    );
    body.push(js.if_then(
        has_errors,
        [
            js.const_decl("message", js.method(js.ident("errors"), "join", [js.string("\n")])),
            js.expr_stmt(js.method(js.ident("console"), "warn", [js.ident("message")])),
            js.ret(js.ident("message")),
        ],
    ));
    body.push(js.ret(js.null()));

    let function = js.function_declaration("validateProps", js.params([js.param("props")], None), body);
    js.export_named(function)
}

/// `if (props.NAME === undefined) props.NAME = DEFAULT;` per defaulted prop.
/// Presence-based, so `0`, `false` and `""` are kept. The default expression
/// must parse; its error is returned with the prop name.
pub fn props_defaults<'a>(
    js: JsBuilder<'a>,
    props: &[PropDescriptor],
) -> Result<Vec<Statement<'a>>, (String, String)> {
    let mut stmts = Vec::new();
    for prop in props {
        let Some(default) = prop.default_expression.as_deref() else {
            continue;
        };
        let value = js
            .parse_expression(default)
            .map_err(|err| (prop.name.clone(), err))?;
        stmts.push(js.if_then(
            js.strict_equal(prop_access(js, &prop.name), js.undefined()),
            [js.expr_stmt(js.assign(prop_target(js, &prop.name), value))],
        ));
    }
    Ok(stmts)
}

fn listeners_for<'a>(js: JsBuilder<'a>) -> MemberExpression<'a> {
    js.computed_member(js.ident("$$listeners"), js.ident("name"))
}

fn listeners_or_empty<'a>(js: JsBuilder<'a>) -> Expression<'a> {
    js.or(Expression::from(listeners_for(js)), js.array([]))
}

/// `on(name, listener)` returning an unsubscribe closure, and
/// `emit(name, ...args)`. Outside production builds `emit` warns about names
/// missing from `emits` and still delivers the event.
pub fn event_emitter<'a>(js: JsBuilder<'a>, emits: &[String], production: bool) -> Vec<Statement<'a>> {
    let mut stmts = vec![js.const_decl("$$listeners", js.object([]))];

    let remaining = js.method(
        Expression::from(listeners_for(js)),
        "filter",
        [js.arrow(&["l"], js.strict_not_equal(js.ident("l"), js.ident("listener")))],
    );
    let unsubscribe = js.arrow_block(&[], [js.expr_stmt(js.assign(listeners_for(js), remaining))]);
    stmts.push(js.function(
        "on",
        js.params([js.param("name"), js.param("listener")], None),
        [
            js.expr_stmt(js.assign(listeners_for(js), listeners_or_empty(js))),
            js.expr_stmt(js.method(Expression::from(listeners_for(js)), "push", [js.ident("listener")])),
            js.ret(unsubscribe),
        ],
    ));

    let mut emit_body = Vec::new();
    if !production {
        stmts.push(js.const_decl("$$emits", js.array(emits.iter().map(|e| js.string(e)))));
        let warning = js.template(vec![
            TemplatePart::Text(format!("[E{}] Undeclared event \"", E_UNDECLARED_EVENT)),
            TemplatePart::Expr(js.ident("name")),
            TemplatePart::Text("\"".to_string()),
        ]);
        emit_body.push(js.if_then(
            js.not(js.method(js.ident("$$emits"), "includes", [js.ident("name")])),
            [js.expr_stmt(js.method(js.ident("console"), "warn", [warning]))],
        ));
    }
    emit_body.push(js.for_of_const(
        "listener",
        js.method(listeners_or_empty(js), "slice", []),
        [js.expr_stmt(js.call_spread(js.ident("listener"), js.ident("args")))],
    ));
    stmts.push(js.function(
        "emit",
        js.params([js.param("name")], Some("args")),
        emit_body,
    ));
    stmts
}

/// `renderSlot(name, scope, fallback)` over the `$$slots` factory argument.
pub fn slot_renderer<'a>(js: JsBuilder<'a>) -> Statement<'a> {
    let content = || js.ident("content");
    js.function(
        "renderSlot",
        js.params([js.param("name"), js.param("scope"), js.param("fallback")], None),
        [
            js.const_decl("content", js.index(js.ident("$$slots"), js.ident("name"))),
            js.if_then(
                js.or(
                    js.strict_equal(content(), js.undefined()),
                    js.strict_equal(content(), js.null()),
                ),
                [js.ret(js.ident("fallback"))],
            ),
            js.if_then(
                js.strict_equal(js.type_of(content()), js.string("function")),
                [js.ret(js.call(content(), [js.ident("scope")]))],
            ),
            js.ret(content()),
        ],
    )
}
