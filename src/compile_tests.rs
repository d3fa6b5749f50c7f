//! End-to-end tests of the compile pipeline.
//!
//! Branch selection, loop output and the generated prop checks are verified
//! by evaluating oxc ASTs (built by the generators or parsed back from the
//! emitted module) with a small interpreter below, which covers the subset of
//! JavaScript the generators emit. Text assertions compare whitespace-free
//! code so they do not depend on printer layout.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, AssignmentTarget, CallExpression, Declaration,
    ExportDefaultDeclarationKind, Expression, ForStatementLeft, Function, ObjectPropertyKind,
    Program, Statement,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::{LogicalOperator, UnaryOperator};

use crate::cache::IncrementalCache;
use crate::compile::*;
use crate::component::extract_props;
use crate::diagnostic::{CollectingSink, ErrorKind, Locator, E_INVALID_JAVASCRIPT, E_UNTERMINATED_BLOCK};
use crate::directives::{build_tree, tokenize, validate_blocks};
use crate::generators::props_defaults;
use crate::js::JsBuilder;
use crate::rewrite::Renames;
use crate::template::TemplateContext;

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Value::Num(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items.iter().map(Value::display).collect::<Vec<_>>().join(","),
            Value::Object(_) => "[object Object]".into(),
        }
    }

    fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
        }
    }

    fn get(&self, property: &str) -> Value {
        match (self, property) {
            (Value::Array(items), "length") => Value::Num(items.len() as f64),
            (Value::Str(s), "length") => Value::Num(s.chars().count() as f64),
            (Value::Array(items), index) => index
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Undefined),
            (Value::Object(map), key) => map.get(key).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => false,
            _ => self == other,
        }
    }

    fn number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            Value::Null => 0.0,
            _ => f64::NAN,
        }
    }
}

fn binary(op: &str, left: Value, right: Value) -> Value {
    match op {
        "===" | "==" => Value::Bool(left.strict_eq(&right)),
        "!==" | "!=" => Value::Bool(!left.strict_eq(&right)),
        "<" => Value::Bool(left.number() < right.number()),
        ">" => Value::Bool(left.number() > right.number()),
        "<=" => Value::Bool(left.number() <= right.number()),
        ">=" => Value::Bool(left.number() >= right.number()),
        "+" => match (&left, &right) {
            (Value::Str(_), _) | (_, Value::Str(_)) => Value::Str(left.display() + &right.display()),
            _ => Value::Num(left.number() + right.number()),
        },
        "-" => Value::Num(left.number() - right.number()),
        "*" => Value::Num(left.number() * right.number()),
        other => panic!("unsupported operator {}", other),
    }
}

fn argument<'s, 'a>(call: &'s CallExpression<'a>, index: usize) -> &'s Expression<'a> {
    call.arguments
        .get(index)
        .and_then(|arg| arg.as_expression())
        .unwrap_or_else(|| panic!("missing argument {}", index))
}

/// Evaluates oxc AST nodes against variables seeded from JSON.
struct Interp {
    scopes: Vec<BTreeMap<String, Value>>,
    warnings: Vec<String>,
}

impl Interp {
    fn new(globals: serde_json::Value) -> Self {
        let root = match Value::from_json(globals) {
            Value::Object(map) => map,
            _ => BTreeMap::new(),
        };
        Interp {
            scopes: vec![root],
            warnings: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .unwrap_or(Value::Undefined)
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn variable_mut(&mut self, name: &str) -> &mut Value {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
            .unwrap_or_else(|| panic!("unknown variable {}", name))
    }

    fn set_property(&mut self, object: &Expression, key: String, value: Value) {
        let Expression::Identifier(id) = object else {
            panic!("unsupported assignment target");
        };
        if let Value::Object(map) = self.variable_mut(id.name.as_str()) {
            map.insert(key, value);
        }
    }

    fn eval(&mut self, expr: &Expression) -> Value {
        match expr {
            Expression::Identifier(id) => match id.name.as_str() {
                "undefined" => Value::Undefined,
                name => self.lookup(name),
            },
            Expression::StringLiteral(s) => Value::Str(s.value.to_string()),
            Expression::NumericLiteral(n) => Value::Num(n.value),
            Expression::BooleanLiteral(b) => Value::Bool(b.value),
            Expression::NullLiteral(_) => Value::Null,
            Expression::ParenthesizedExpression(p) => self.eval(&p.expression),
            Expression::TemplateLiteral(t) => {
                let mut out = String::new();
                for (i, quasi) in t.quasis.iter().enumerate() {
                    out.push_str(quasi.value.cooked.as_ref().map(|c| c.as_str()).unwrap_or(""));
                    if let Some(e) = t.expressions.get(i) {
                        out.push_str(&self.eval(e).display());
                    }
                }
                Value::Str(out)
            }
            Expression::ConditionalExpression(c) => {
                if self.eval(&c.test).truthy() {
                    self.eval(&c.consequent)
                } else {
                    self.eval(&c.alternate)
                }
            }
            Expression::LogicalExpression(l) => {
                let left = self.eval(&l.left);
                match l.operator {
                    LogicalOperator::Or if left.truthy() => left,
                    LogicalOperator::And if !left.truthy() => left,
                    LogicalOperator::Coalesce if !matches!(left, Value::Null | Value::Undefined) => left,
                    _ => self.eval(&l.right),
                }
            }
            Expression::BinaryExpression(b) => {
                let left = self.eval(&b.left);
                let right = self.eval(&b.right);
                binary(b.operator.as_str(), left, right)
            }
            Expression::UnaryExpression(u) => {
                let value = self.eval(&u.argument);
                match u.operator {
                    UnaryOperator::LogicalNot => Value::Bool(!value.truthy()),
                    UnaryOperator::Typeof => Value::Str(value.type_of().to_string()),
                    UnaryOperator::UnaryNegation => Value::Num(-value.number()),
                    other => panic!("unsupported unary {:?}", other),
                }
            }
            Expression::StaticMemberExpression(m) => self.eval(&m.object).get(m.property.name.as_str()),
            Expression::ComputedMemberExpression(m) => {
                let object = self.eval(&m.object);
                let key = self.eval(&m.expression).display();
                object.get(&key)
            }
            Expression::CallExpression(c) => self.call(c),
            Expression::ArrayExpression(a) => {
                let mut items = Vec::new();
                for element in &a.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            if let Value::Array(spread) = self.eval(&spread.argument) {
                                items.extend(spread);
                            }
                        }
                        other => {
                            let e = other.as_expression().expect("array element");
                            items.push(self.eval(e));
                        }
                    }
                }
                Value::Array(items)
            }
            Expression::ObjectExpression(o) => {
                let mut map = BTreeMap::new();
                for property in &o.properties {
                    match property {
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            if let Value::Object(spread) = self.eval(&spread.argument) {
                                map.extend(spread);
                            }
                        }
                        ObjectPropertyKind::ObjectProperty(p) => {
                            let key = p.key.static_name().expect("static key").to_string();
                            let value = self.eval(&p.value);
                            map.insert(key, value);
                        }
                    }
                }
                Value::Object(map)
            }
            Expression::AssignmentExpression(a) => {
                let value = self.eval(&a.right);
                match &a.left {
                    AssignmentTarget::AssignmentTargetIdentifier(id) => {
                        *self.variable_mut(id.name.as_str()) = value.clone();
                    }
                    AssignmentTarget::StaticMemberExpression(m) => {
                        self.set_property(&m.object, m.property.name.to_string(), value.clone());
                    }
                    AssignmentTarget::ComputedMemberExpression(m) => {
                        let key = self.eval(&m.expression).display();
                        self.set_property(&m.object, key, value.clone());
                    }
                    _ => panic!("unsupported assignment target"),
                }
                value
            }
            Expression::ArrowFunctionExpression(_) => Value::Undefined,
            _ => panic!("unsupported expression"),
        }
    }

    fn call(&mut self, call: &CallExpression) -> Value {
        let Expression::StaticMemberExpression(callee) = &call.callee else {
            panic!("unsupported callee");
        };
        let object = &callee.object;
        let receiver = match object {
            Expression::Identifier(id) => Some(id.name.as_str()),
            _ => None,
        };
        match (receiver, callee.property.name.as_str()) {
            (Some("Array"), "isArray") => Value::Bool(matches!(self.eval(argument(call, 0)), Value::Array(_))),
            (Some("console"), "warn") => {
                let message = self.eval(argument(call, 0)).display();
                self.warnings.push(message);
                Value::Undefined
            }
            (Some(name), "push") => {
                let item = self.eval(argument(call, 0));
                match self.variable_mut(name) {
                    Value::Array(items) => {
                        items.push(item);
                        Value::Num(items.len() as f64)
                    }
                    other => panic!("push on {:?}", other),
                }
            }
            (_, "map") => {
                let Value::Array(items) = self.eval(object) else {
                    panic!("map on a non-array");
                };
                let Expression::ArrowFunctionExpression(arrow) = argument(call, 0) else {
                    panic!("map expects an arrow");
                };
                let body = arrow.get_expression().expect("expression-bodied arrow");
                let params: Vec<String> = arrow
                    .params
                    .items
                    .iter()
                    .filter_map(|p| p.pattern.get_identifier_name())
                    .map(|name| name.to_string())
                    .collect();
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let mut scope = BTreeMap::new();
                    if let Some(p) = params.first() {
                        scope.insert(p.clone(), item);
                    }
                    if let Some(p) = params.get(1) {
                        scope.insert(p.clone(), Value::Num(index as f64));
                    }
                    self.scopes.push(scope);
                    mapped.push(self.eval(body));
                    self.scopes.pop();
                }
                Value::Array(mapped)
            }
            (_, "join") => {
                let separator = self.eval(argument(call, 0)).display();
                match self.eval(object) {
                    Value::Array(items) => Value::Str(
                        items.iter().map(Value::display).collect::<Vec<_>>().join(&separator),
                    ),
                    other => panic!("join on {:?}", other),
                }
            }
            (_, "includes") => {
                let needle = self.eval(argument(call, 0));
                match self.eval(object) {
                    Value::Array(items) => Value::Bool(items.iter().any(|i| i.strict_eq(&needle))),
                    other => panic!("includes on {:?}", other),
                }
            }
            (_, other) => panic!("unsupported method {}", other),
        }
    }

    /// Runs statements; `Some` carries a `return` value.
    fn exec(&mut self, stmts: &[Statement]) -> Option<Value> {
        for stmt in stmts {
            let result = match stmt {
                Statement::VariableDeclaration(d) => {
                    for declarator in &d.declarations {
                        let name = declarator.id.get_identifier_name().expect("simple binding");
                        let value = match &declarator.init {
                            Some(init) => self.eval(init),
                            None => Value::Undefined,
                        };
                        self.declare(name.as_str(), value);
                    }
                    None
                }
                Statement::ExpressionStatement(e) => {
                    self.eval(&e.expression);
                    None
                }
                Statement::IfStatement(i) => {
                    if self.eval(&i.test).truthy() {
                        self.exec(std::slice::from_ref(&i.consequent))
                    } else if let Some(alternate) = &i.alternate {
                        self.exec(std::slice::from_ref(alternate))
                    } else {
                        None
                    }
                }
                Statement::BlockStatement(b) => {
                    self.scopes.push(BTreeMap::new());
                    let result = self.exec(&b.body);
                    self.scopes.pop();
                    result
                }
                Statement::ReturnStatement(r) => Some(match &r.argument {
                    Some(e) => self.eval(e),
                    None => Value::Undefined,
                }),
                Statement::ForOfStatement(f) => {
                    let ForStatementLeft::VariableDeclaration(d) = &f.left else {
                        panic!("unsupported for-of binding");
                    };
                    let binding = d.declarations[0]
                        .id
                        .get_identifier_name()
                        .expect("simple binding")
                        .to_string();
                    let mut result = None;
                    if let Value::Array(items) = self.eval(&f.right) {
                        for item in items {
                            self.scopes.push(BTreeMap::from([(binding.clone(), item)]));
                            result = self.exec(std::slice::from_ref(&f.body));
                            self.scopes.pop();
                            if result.is_some() {
                                break;
                            }
                        }
                    }
                    result
                }
                _ => None,
            };
            if result.is_some() {
                return result;
            }
        }
        None
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> Value {
        let scope = function
            .params
            .items
            .iter()
            .filter_map(|p| p.pattern.get_identifier_name())
            .map(|name| name.to_string())
            .zip(args)
            .collect();
        self.scopes.push(scope);
        let result = function.body.as_ref().and_then(|body| self.exec(&body.statements));
        self.scopes.pop();
        result.unwrap_or(Value::Undefined)
    }
}

/// A function declared by name in `stmts`, exported or not, searching nested
/// function bodies too.
fn find_function<'s, 'a>(stmts: &'s [Statement<'a>], name: &str) -> Option<&'s Function<'a>> {
    for stmt in stmts {
        let function = match stmt {
            Statement::FunctionDeclaration(f) => Some(&**f),
            Statement::ExportNamedDeclaration(e) => match &e.declaration {
                Some(Declaration::FunctionDeclaration(f)) => Some(&**f),
                _ => None,
            },
            Statement::ExportDefaultDeclaration(e) => match &e.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(f) => Some(&**f),
                _ => None,
            },
            _ => None,
        };
        let Some(function) = function else {
            continue;
        };
        if function.id.as_ref().is_some_and(|id| id.name.as_str() == name) {
            return Some(function);
        }
        if let Some(found) = function
            .body
            .as_ref()
            .and_then(|body| find_function(&body.statements, name))
        {
            return Some(found);
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn options(name: &str) -> CompileOptions {
    CompileOptions {
        component_name: Some(name.to_string()),
        file: Some(format!("{}.aspc", name)),
        ..CompileOptions::default()
    }
}

fn compile_ok(source: &str, opts: &CompileOptions) -> String {
    match compile(source, opts) {
        Ok(code) => code,
        Err(e) => panic!("compile failed:\n{}", e.render()),
    }
}

fn squash(code: &str) -> String {
    code.split_whitespace().collect()
}

/// Parses emitted code, failing the test on any syntax error, and hands the
/// program to `f`.
fn with_program<R>(code: &str, f: impl FnOnce(&Program<'_>) -> R) -> R {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
    assert!(
        ret.errors.is_empty(),
        "emitted module does not parse: {:?}\n{}",
        ret.errors,
        code
    );
    f(&ret.program)
}

fn assert_parses(code: &str) {
    with_program(code, |_| ());
}

/// Calls the function `name` declared in `code` with `args`, returning the
/// result and the warnings it logged.
fn call_emitted(code: &str, name: &str, env: serde_json::Value, args: Vec<Value>) -> (Value, Vec<String>) {
    with_program(code, |program| {
        let function = find_function(&program.body, name).unwrap_or_else(|| panic!("no function {}", name));
        let mut interp = Interp::new(env);
        let result = interp.call_function(function, args);
        (result, interp.warnings)
    })
}

/// Compiles `template` with `cells` rewritten to `.value` and returns the
/// printed render expression and its value under `env`.
fn render_with(template: &str, cells: &[&str], env: serde_json::Value) -> (String, String) {
    let loc = Locator::new("T.aspc", template, 0);
    let tokens = tokenize(template, &loc).unwrap();
    validate_blocks(&tokens, &loc).unwrap();
    let nodes = build_tree(tokens, &loc).unwrap();
    let states: BTreeSet<String> = cells.iter().map(|c| c.to_string()).collect();
    let mut renames = Renames::new();
    for cell in cells {
        renames.add_cell(cell);
    }
    let allocator = Allocator::default();
    let js = JsBuilder::new(&allocator);
    let expr = TemplateContext { states: &states, loc, js }
        .compile(&nodes, &renames, None)
        .unwrap();
    let value = Interp::new(env).eval(&expr).display();
    (squash(&js.print_expression(expr)), value)
}

fn render(template: &str, cells: &[&str], env: serde_json::Value) -> String {
    render_with(template, cells, env).1
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_counter_module() {
    let source = "---\nlet count = $state(0)\n---\n<template><p>{count}</p></template>";
    let code = compile_ok(source, &options("Counter"));
    let flat = squash(&code);

    assert!(flat.starts_with("import{$state,$computed,$effect}from\"aspc/runtime\";"));
    assert!(flat.contains("exportdefaultfunctionCounter($$props={},$$slots={}){"));
    assert!(flat.contains("constprops={...$$props};"));
    assert!(flat.contains("constcount=$state(0);"));
    assert!(flat.contains("return`<p>${count.value}</p>`;"));
    assert!(flat.contains("slots:[]}"));
    assert!(flat.contains("Counter.__aspc={name:\"Counter\",scopeId:\"aspc-counter\""));
    assert!(!flat.contains("exportconststyles"));
    assert!(!flat.contains("aspc-counter\">"));
    assert_parses(&code);
}

#[test]
fn test_validation_warns_about_missing_required_prop() {
    let source = "---\nexport const props = { name: { type: String, required: true } }\n---\n<p>Hello {name}</p>";
    let result = compile_component(source, &options("Greeting"), &CollectingSink::new()).unwrap();
    let flat = squash(&result.code);
    assert!(flat.contains("${props.name}"));
    assert!(flat.contains("validateProps(props);"));

    let empty = Value::Object(BTreeMap::new());
    let (warning, warnings) = call_emitted(&result.code, "validateProps", serde_json::json!({}), vec![empty]);
    let warning = warning.display();
    assert!(warning.contains("\"name\""));
    assert!(warning.contains("required"));
    assert_eq!(warnings, vec![warning]);

    let props = Value::from_json(serde_json::json!({ "name": 3 }));
    let (warning, _) = call_emitted(&result.code, "validateProps", serde_json::json!({}), vec![props]);
    assert_eq!(
        warning.display(),
        "[E3002] Invalid prop \"name\": expected String, got number"
    );

    let props = Value::from_json(serde_json::json!({ "name": "Ada" }));
    let (result, warnings) = call_emitted(&result.code, "validateProps", serde_json::json!({}), vec![props]);
    assert_eq!(result, Value::Null);
    assert!(warnings.is_empty());
}

#[test]
fn test_array_and_object_type_checks() {
    let source = "---\nexport const props = { tags: { type: Array }, opts: { type: Object } }\n---\n<p></p>";
    let code = compile_ok(source, &options("Typed"));
    let check = |props: serde_json::Value| {
        call_emitted(&code, "validateProps", serde_json::json!({}), vec![Value::from_json(props)])
            .0
            .display()
    };
    assert_eq!(check(serde_json::json!({ "tags": [], "opts": {} })), "null");
    assert_eq!(
        check(serde_json::json!({ "tags": {}, "opts": [] })),
        "[E3002] Invalid prop \"tags\": expected Array, got object\n[E3002] Invalid prop \"opts\": expected Object, got array"
    );
    assert_eq!(
        check(serde_json::json!({ "opts": null })),
        "[E3002] Invalid prop \"opts\": expected Object, got null"
    );
}

#[test]
fn test_defaults_keep_explicit_falsy_values() {
    let props = extract_props(
        "export const props = { count: { type: Number, default: 10 }, start: { type: Number, default: 0 } }",
    );
    let allocator = Allocator::default();
    let js = JsBuilder::new(&allocator);
    let defaults = props_defaults(js, &props).unwrap();

    let mut interp = Interp::new(serde_json::json!({ "props": { "count": 0 } }));
    interp.exec(&defaults);
    assert_eq!(interp.lookup("props").get("count"), Value::Num(0.0));
    assert_eq!(interp.lookup("props").get("start"), Value::Num(0.0));

    let mut interp = Interp::new(serde_json::json!({ "props": {} }));
    interp.exec(&defaults);
    assert_eq!(interp.lookup("props").get("count"), Value::Num(10.0));
}

#[test]
fn test_if_chain_selects_first_true_branch() {
    let template = "{#if a}A{:else if b}B{:else if c}C{:else}E{/if}";
    for (a, b, c, expected) in [
        (true, true, true, "A"),
        (false, true, true, "B"),
        (false, false, true, "C"),
        (false, false, false, "E"),
    ] {
        let env = serde_json::json!({ "a": a, "b": b, "c": c });
        assert_eq!(render(template, &[], env), expected);
    }
    let without_else = "<i>{#if a}A{:else if b}B{/if}</i>";
    assert_eq!(render(without_else, &[], serde_json::json!({ "a": false, "b": false })), "<i></i>");
}

#[test]
fn test_nested_blocks_evaluate() {
    let template = "{#for row in rows}{#if row.on}[{row.name}]{:else}-{/if}{/for}";
    let env = serde_json::json!({ "rows": [
        { "on": true, "name": "x" },
        { "on": false, "name": "y" },
        { "on": true, "name": "z" },
    ] });
    assert_eq!(render(template, &[], env), "[x]-[z]");
}

#[test]
fn test_for_loop_binds_item_and_index() {
    let template = "{#for (item, index) in items}<li>{index}: {item}</li>{/for}";
    let env = serde_json::json!({ "items": ["a", "b"] });
    assert_eq!(render(template, &[], env), "<li>0: a</li><li>1: b</li>");

    let env = serde_json::json!({ "items": { "value": ["a", "b"] } });
    assert_eq!(render(template, &["items"], env), "<li>0: a</li><li>1: b</li>");
}

#[test]
fn test_each_synonym_has_identical_shape() {
    let env = serde_json::json!({ "list": { "value": [{ "id": 7, "name": "a" }, { "id": 9, "name": "b" }] } });
    let (for_code, for_value) = render_with(
        "{#for item, i in list :key=\"item.id\"}<b>{item.name}</b>{/for}",
        &["list"],
        env.clone(),
    );
    let (each_code, each_value) = render_with(
        "{#each list as item, i :key=\"item.id\"}<b>{item.name}</b>{/each}",
        &["list"],
        env,
    );
    assert_eq!(for_code, each_code);
    assert_eq!(for_value, each_value);
    assert_eq!(each_value, "<!--key:7--><b>a</b><!--key:9--><b>b</b>");
}

#[test]
fn test_loop_item_shadows_state() {
    let code = compile_ok(
        "---\nlet item = $state('outer')\nlet items = $state([])\n---\n<p>{item}</p>{#for item in items}<i>{item}</i>{/for}",
        &options("Shadow"),
    );
    let flat = squash(&code);
    assert!(flat.contains("<p>${item.value}</p>"));
    assert!(flat.contains("items.value.map("));
    assert!(flat.contains("=>`<i>${item}</i>`).join(\"\")"));
    assert_parses(&code);
}

#[test]
fn test_word_boundary_rewriting() {
    let code = compile_ok(
        "---\nlet count = $state(1)\nconst discount = 5\n$: total = count * discount\n---\n<p>{count + discount} {total}</p>",
        &options("Price"),
    );
    let flat = squash(&code);
    assert!(flat.contains("constdiscount=5"));
    assert!(flat.contains("consttotal=$computed(()=>"));
    assert!(flat.contains("count.value*discount"));
    assert!(flat.contains("${count.value+discount}${total.value}"));
    assert_parses(&code);
}

#[test]
fn test_events_bindings_and_markers() {
    let source = r#"<script>
let text = $state("")
let open = $state(false)
export const emits = ["save"]
function submit() { emit("save", text) }
</script>
<template>
  <form @submit="submit()">
    <input #bind="text" :class="{ active: open }" :style="open ? 'color: red' : ''" />
    <button @click="open = !open">toggle</button>
  </form>
</template>"#;
    let code = compile_ok(source, &options("Editor"));
    let flat = squash(&code);
    assert!(flat.contains("data-aspc-on-submit=\"submit()\""));
    assert!(flat.contains("data-aspc-bind=\"text\""));
    assert!(flat.contains("data-aspc-on-click=\"open.value=!open.value\""));
    assert!(flat.contains("data-aspc-class=\"{active:open.value}\""));
    assert!(flat.contains("const$$emits=[\"save\"];"));
    assert!(flat.contains("functionsubmit(){emit(\"save\",text.value);"));
    assert_parses(&code);
}

#[test]
fn test_slots_and_metadata() {
    let source = "<template><header><slot name=\"title\">Untitled</slot></header><slot :item=\"current\" /></template>\n<script>let current = $state(1)</script>";
    let result = compile_component(source, &options("Panel"), &CollectingSink::new()).unwrap();
    assert_eq!(result.metadata.slots.names(), vec!["default".to_string(), "title".to_string()]);
    let flat = squash(&result.code);
    assert!(flat.contains("functionrenderSlot(name,scope,fallback){"));
    assert!(flat.contains("renderSlot(\"title\",{},\"Untitled\")"));
    assert!(flat.contains("renderSlot(\"default\",{item:current.value},\"\")"));
    assert!(flat.contains("slots:[\"default\",\"title\"]}"));

    let env = serde_json::json!({ "$$slots": { "title": "<b>T</b>", "empty": null } });
    let slot = |name: &str| {
        let args = vec![
            Value::Str(name.to_string()),
            Value::Object(BTreeMap::new()),
            Value::Str("fallback".to_string()),
        ];
        call_emitted(&result.code, "renderSlot", env.clone(), args).0
    };
    assert_eq!(slot("title"), Value::Str("<b>T</b>".to_string()));
    assert_eq!(slot("empty"), Value::Str("fallback".to_string()));
    assert_eq!(slot("missing"), Value::Str("fallback".to_string()));
}

#[test]
fn test_same_slot_in_exclusive_branches_compiles() {
    let source = "---\nlet a = $state(true)\n---\n{#if a}<div><slot/></div>{:else}<span><slot/></span>{/if}";
    let result = compile_component(source, &options("Switch"), &CollectingSink::new()).unwrap();
    assert_eq!(result.metadata.slots.names(), vec!["default".to_string()]);
    let flat = squash(&result.code);
    assert_eq!(flat.matches("renderSlot(\"default\"").count(), 2);
    assert!(flat.contains("slots:[\"default\"]}"));
    assert_parses(&result.code);
}

#[test]
fn test_scoped_styles() {
    let source = r#"<template><h1 class="title">{heading}</h1></template>
<script>export const props = { heading: { type: String, default: "Hi" } }</script>
<style lang="scss">
$accent: #c33;
.title { color: $accent; &:hover { color: black; } }
:root { --x: 1; }
</style>"#;
    let result = compile_component(source, &options("Card"), &CollectingSink::new()).unwrap();
    let css = result.styles.clone().unwrap();
    assert!(css.contains(".aspc-card .title {\n  color: #c33;\n}"));
    assert!(css.contains(".aspc-card .title:hover {"));
    assert!(css.contains(":root {"));
    assert!(!css.contains("$accent"));
    let flat = squash(&result.code);
    assert!(flat.contains("exportconststyles="));
    assert!(flat.contains("`<divclass=\"aspc-card\"><h1class=\"title\">${props.heading}</h1></div>`"));
    assert!(flat.contains("if(props.heading===undefined)"));
    assert_parses(&result.code);
}

#[test]
fn test_production_ssr_and_hmr() {
    let source = "---\nlet n = $state(0)\n$: console.log(n)\nexport const emits = ['tick']\n---\n<p>{n}</p>";

    let dev = squash(&compile_ok(source, &options("Ticker")));
    assert!(dev.contains("exportfunctionvalidateProps(props){"));
    assert!(dev.contains("$effect(()=>{console.log(n.value);});"));
    assert!(!dev.contains("import.meta.hot"));

    let prod = compile_ok(
        source,
        &CompileOptions {
            production: true,
            ..options("Ticker")
        },
    );
    assert!(!prod.contains("validateProps"));
    assert!(!prod.contains("E3003"));
    assert_parses(&prod);

    let ssr = compile_ok(
        source,
        &CompileOptions {
            ssr: true,
            hmr: true,
            runtime_module: "/runtime.js".to_string(),
            ..options("Ticker")
        },
    );
    let flat = squash(&ssr);
    assert!(!flat.contains("$effect(()=>"));
    assert!(flat.contains("from\"/runtime.js\";"));
    assert!(flat.contains("ssr:true"));
    assert!(flat.ends_with("if(import.meta.hot){import.meta.hot.accept();}"));
    assert_parses(&ssr);
}

#[test]
fn test_hoisted_imports_and_global() {
    let source = "---\nimport { format } from './format.js'\nconst theme = $global('light', 'theme')\nlet n = $state(0)\n---\n<p>{format(n)}</p>";
    let code = compile_ok(source, &options("Fmt"));
    let flat = squash(&code);
    assert!(flat.starts_with("import{$state,$computed,$effect,$global}from\"aspc/runtime\";import{format}from"));
    assert!(flat.contains("format.js"));
    assert!(flat.contains("${format(n.value)}"));
    assert_parses(&code);
}

#[test]
fn test_unterminated_if_reports_position() {
    let source = "---\nlet x = $state(1)\n---\n{#if x}<p>{x}</p>";
    let sink = CollectingSink::new();
    let err = compile_with_sink(source, &options("Broken"), &sink).unwrap_err();
    assert_eq!(err.code, E_UNTERMINATED_BLOCK);
    assert_eq!(err.kind, ErrorKind::Directive);
    assert_eq!((err.line, err.column), (4, 1));
    assert_eq!(err.file, "Broken.aspc");

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("error[E2001]"));
    assert!(reports[0].contains("--> Broken.aspc:4:1"));
}

#[test]
fn test_invalid_javascript_is_a_syntax_error() {
    let err = compile("---\nlet x = (1\n---\n<p>{x}</p>", &options("Script")).unwrap_err();
    assert_eq!(err.code, E_INVALID_JAVASCRIPT);
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert_eq!(err.line, 2);

    let err = compile("---\nlet x = $state(1)\n---\n<p>\n{x +}</p>", &options("Expr")).unwrap_err();
    assert_eq!(err.code, E_INVALID_JAVASCRIPT);
    assert_eq!(err.line, 5);
}

#[test]
fn test_style_errors_propagate() {
    let err = compile("<p>x</p><style>.a { color: red;</style>", &options("Bad")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Style);
    let err = compile("<p>x</p><style lang=\"scss\">.a { color: $nope; }</style>", &options("Bad")).unwrap_err();
    assert_eq!(err.code, 4002);
}

#[test]
fn test_compile_is_deterministic() {
    let source = "---\nexport const props = { b: { type: Number }, a: { type: String, required: true } }\nlet x = $state({ k: 1 })\n---\n<template>{#each [1, 2] as n}<i>{n} {x.k} {a}</i>{/each}<slot name=\"z\"/><slot name=\"y\"/></template>\n<style>.i { margin: 0 }</style>";
    let first = compile_ok(source, &options("Stable"));
    let second = compile_ok(source, &options("Stable"));
    assert_eq!(first, second);

    let inputs: Vec<(String, CompileOptions)> = (0..8).map(|_| (source.to_string(), options("Stable"))).collect();
    for result in compile_many(&inputs) {
        assert_eq!(result.unwrap(), first);
    }
    assert_parses(&first);
}

#[test]
fn test_component_name_derivation() {
    let opts = CompileOptions {
        file: Some("src/components/user-card.aspc".to_string()),
        ..CompileOptions::default()
    };
    assert_eq!(opts.resolved_component_name(), "UserCard");
    let code = compile_ok("<p>hi</p>", &opts);
    assert!(code.contains("export default function UserCard("));
    assert_eq!(CompileOptions::default().resolved_component_name(), "Component");

    let parsed: CompileOptions =
        serde_json::from_str(r#"{"componentName": "x-box", "ssr": true}"#).unwrap();
    assert_eq!(parsed.resolved_component_name(), "XBox");
    assert!(parsed.ssr);
    assert_eq!(parsed.runtime_module, DEFAULT_RUNTIME_MODULE);
}

#[test]
fn test_cache_hits_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let source = "---\nlet n = $state(2)\n---\n<b>{n}</b>";
    let opts = options("Cached");

    let cache = IncrementalCache::with_dir(dir.path());
    assert!(cache.get(source, &opts).is_none());
    let code = cache.compile_cached(source, &opts).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.compile_cached(source, &opts).unwrap(), code);
    assert_eq!(cache.len(), 1);

    let other = CompileOptions {
        production: true,
        ..opts.clone()
    };
    assert!(cache.get(source, &other).is_none());

    let reopened = IncrementalCache::with_dir(dir.path());
    assert_eq!(reopened.get(source, &opts), Some(code));

    assert!(cache.compile_cached("{/if}", &opts).is_err());
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_compile_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("Good.aspc"), "<p>ok</p>").unwrap();
    fs::write(dir.path().join("nested/bad-one.aspc"), "{#if x}").unwrap();
    fs::write(dir.path().join("notes.txt"), "{#if x}").unwrap();

    let compiled = compile_dir(dir.path(), &CompileOptions::default()).unwrap();
    assert_eq!(compiled.len(), 2);
    let good = compiled[0].result.as_ref().unwrap();
    assert!(good.contains("export default function Good("));
    let bad = compiled[1].result.as_ref().unwrap_err();
    assert_eq!(bad.code, E_UNTERMINATED_BLOCK);
    assert!(bad.file.ends_with("bad-one.aspc"));
}

#[test]
fn test_runtime_source_exports() {
    for name in ["$state", "$computed", "$effect", "$global", "untrack"] {
        assert!(
            crate::RUNTIME_MODULE_SOURCE.contains(&format!("export function {}(", name)),
            "runtime is missing {}",
            name
        );
    }
    assert_parses(crate::RUNTIME_MODULE_SOURCE);
}

#[test]
fn test_runtime_holds_subscribers_weakly() {
    let source = crate::RUNTIME_MODULE_SOURCE;
    let body = |name: &str| {
        with_program(source, |program| {
            let function = find_function(&program.body, name).unwrap_or_else(|| panic!("no function {}", name));
            let span = function.span;
            source[span.start as usize..span.end as usize].to_string()
        })
    };
    let subscriber = body("subscriber");
    assert!(subscriber.contains("new WeakRef("));
    let track = body("track");
    assert!(track.contains("observer.ref"));
    let trigger = body("trigger");
    assert!(trigger.contains("deref()"));
    assert!(trigger.contains("edges.delete(id)"));
}
