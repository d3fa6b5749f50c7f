//! JavaScript construction and printing.
//!
//! Generated modules are built as an oxc AST through [`JsBuilder`] and printed
//! once with `oxc_codegen`. User-authored code (rewritten template
//! expressions, the lowered script body, hoisted imports) is parsed into the
//! same arena, so a syntax error there surfaces at compile time instead of in
//! the emitted module.

use oxc_allocator::{Allocator, Vec as ArenaVec};
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, AssignmentTarget, BindingPattern, Declaration, Expression,
    FormalParameter, FormalParameterKind, FormalParameters, FunctionType, ImportOrExportKind,
    MemberExpression, ObjectPropertyKind, PropertyKey, PropertyKind, SimpleAssignmentTarget,
    Statement, TemplateElementValue, VariableDeclarationKind,
};
use oxc_ast::{AstBuilder, NONE};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::{SourceType, SPAN};
use oxc_syntax::number::NumberBase;
use oxc_syntax::operator::{AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator};

use crate::scan::is_identifier;

/// A piece of a template literal: static text or an interpolated expression.
pub enum TemplatePart<'a> {
    Text(String),
    Expr(Expression<'a>),
}

/// Escapes text for the raw value of a template literal quasi.
pub fn escape_template_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out
}

fn describe<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Thin layer over [`AstBuilder`] with the node shapes the generators need.
#[derive(Clone, Copy)]
pub struct JsBuilder<'a> {
    pub ast: AstBuilder<'a>,
}

impl<'a> JsBuilder<'a> {
    pub fn new(allocator: &'a Allocator) -> Self {
        JsBuilder {
            ast: AstBuilder::new(allocator),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PARSING
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn parse_expression(self, code: &str) -> Result<Expression<'a>, String> {
        let text = self.ast.str(code);
        Parser::new(self.ast.allocator, text, SourceType::mjs())
            .parse_expression()
            .map_err(|errors| describe(&errors))
    }

    /// Module-level statements of `code`.
    pub fn parse_statements(self, code: &str) -> Result<ArenaVec<'a, Statement<'a>>, String> {
        let text = self.ast.str(code);
        let ret = Parser::new(self.ast.allocator, text, SourceType::mjs()).parse();
        if !ret.errors.is_empty() {
            return Err(describe(&ret.errors));
        }
        Ok(ret.program.body)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRINTING
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn print(self, body: ArenaVec<'a, Statement<'a>>) -> String {
        let program = self.ast.program(
            SPAN,
            SourceType::mjs(),
            "",
            self.ast.vec(),
            None,
            self.ast.vec(),
            body,
        );
        Codegen::new().build(&program).code
    }

    /// Prints a single expression without the trailing semicolon.
    pub fn print_expression(self, expr: Expression<'a>) -> String {
        let code = self.print(self.ast.vec1(self.expr_stmt(expr)));
        code.trim_end().trim_end_matches(';').to_string()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn ident(self, name: &str) -> Expression<'a> {
        self.ast.expression_identifier(SPAN, self.ast.atom(name))
    }

    pub fn string(self, value: &str) -> Expression<'a> {
        self.ast.expression_string_literal(SPAN, self.ast.atom(value), None)
    }

    pub fn boolean(self, value: bool) -> Expression<'a> {
        self.ast.expression_boolean_literal(SPAN, value)
    }

    pub fn null(self) -> Expression<'a> {
        self.ast.expression_null_literal(SPAN)
    }

    pub fn undefined(self) -> Expression<'a> {
        self.ident("undefined")
    }

    pub fn number(self, value: f64) -> Expression<'a> {
        self.ast
            .expression_numeric_literal(SPAN, value, None, NumberBase::Decimal)
    }

    /// JSON data as a literal.
    pub fn json(self, value: &serde_json::Value) -> Expression<'a> {
        match value {
            serde_json::Value::Null => self.null(),
            serde_json::Value::Bool(b) => self.boolean(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(v) if v < 0.0 => self.negate(self.number(-v)),
                Some(v) => self.number(v),
                None => self.null(),
            },
            serde_json::Value::String(s) => self.string(s),
            serde_json::Value::Array(items) => self.array(items.iter().map(|i| self.json(i))),
            serde_json::Value::Object(map) => {
                self.object(map.iter().map(|(k, v)| self.property(k, self.json(v))))
            }
        }
    }

    pub fn static_member(self, object: Expression<'a>, property: &str) -> MemberExpression<'a> {
        let name = self.ast.identifier_name(SPAN, self.ast.atom(property));
        self.ast.member_expression_static(SPAN, object, name, false)
    }

    pub fn computed_member(self, object: Expression<'a>, key: Expression<'a>) -> MemberExpression<'a> {
        self.ast.member_expression_computed(SPAN, object, key, false)
    }

    /// `object.property`, or `object["property"]` when it is not an identifier.
    pub fn member_or_index(self, object: Expression<'a>, property: &str) -> MemberExpression<'a> {
        if is_identifier(property) {
            self.static_member(object, property)
        } else {
            self.computed_member(object, self.string(property))
        }
    }

    pub fn member(self, object: Expression<'a>, property: &str) -> Expression<'a> {
        Expression::from(self.static_member(object, property))
    }

    pub fn index(self, object: Expression<'a>, key: Expression<'a>) -> Expression<'a> {
        Expression::from(self.computed_member(object, key))
    }

    pub fn call(
        self,
        callee: Expression<'a>,
        args: impl IntoIterator<Item = Expression<'a>>,
    ) -> Expression<'a> {
        let args = self.ast.vec_from_iter(args.into_iter().map(Argument::from));
        self.ast.expression_call(SPAN, callee, NONE, args, false)
    }

    /// `callee(...spread)`.
    pub fn call_spread(self, callee: Expression<'a>, spread: Expression<'a>) -> Expression<'a> {
        let args = self.ast.vec1(self.ast.argument_spread_element(SPAN, spread));
        self.ast.expression_call(SPAN, callee, NONE, args, false)
    }

    /// `object.name(args)`.
    pub fn method(
        self,
        object: Expression<'a>,
        name: &str,
        args: impl IntoIterator<Item = Expression<'a>>,
    ) -> Expression<'a> {
        self.call(self.member(object, name), args)
    }

    pub fn binary(self, left: Expression<'a>, op: BinaryOperator, right: Expression<'a>) -> Expression<'a> {
        self.ast.expression_binary(SPAN, left, op, right)
    }

    pub fn strict_equal(self, left: Expression<'a>, right: Expression<'a>) -> Expression<'a> {
        self.binary(left, BinaryOperator::StrictEquality, right)
    }

    pub fn strict_not_equal(self, left: Expression<'a>, right: Expression<'a>) -> Expression<'a> {
        self.binary(left, BinaryOperator::StrictInequality, right)
    }

    pub fn or(self, left: Expression<'a>, right: Expression<'a>) -> Expression<'a> {
        self.ast.expression_logical(SPAN, left, LogicalOperator::Or, right)
    }

    pub fn and(self, left: Expression<'a>, right: Expression<'a>) -> Expression<'a> {
        self.ast.expression_logical(SPAN, left, LogicalOperator::And, right)
    }

    pub fn not(self, argument: Expression<'a>) -> Expression<'a> {
        self.ast.expression_unary(SPAN, UnaryOperator::LogicalNot, argument)
    }

    pub fn type_of(self, argument: Expression<'a>) -> Expression<'a> {
        self.ast.expression_unary(SPAN, UnaryOperator::Typeof, argument)
    }

    fn negate(self, argument: Expression<'a>) -> Expression<'a> {
        self.ast.expression_unary(SPAN, UnaryOperator::UnaryNegation, argument)
    }

    pub fn conditional(
        self,
        test: Expression<'a>,
        consequent: Expression<'a>,
        alternate: Expression<'a>,
    ) -> Expression<'a> {
        self.ast.expression_conditional(SPAN, test, consequent, alternate)
    }

    pub fn assign(self, target: MemberExpression<'a>, value: Expression<'a>) -> Expression<'a> {
        let target = AssignmentTarget::from(SimpleAssignmentTarget::from(target));
        self.ast
            .expression_assignment(SPAN, AssignmentOperator::Assign, target, value)
    }

    fn property_key(self, key: &str) -> PropertyKey<'a> {
        if is_identifier(key) {
            self.ast.property_key_static_identifier(SPAN, self.ast.atom(key))
        } else {
            PropertyKey::from(self.string(key))
        }
    }

    pub fn property(self, key: &str, value: Expression<'a>) -> ObjectPropertyKind<'a> {
        self.ast.object_property_kind_object_property(
            SPAN,
            PropertyKind::Init,
            self.property_key(key),
            value,
            false,
            false,
            false,
        )
    }

    pub fn spread_property(self, argument: Expression<'a>) -> ObjectPropertyKind<'a> {
        self.ast.object_property_kind_spread_property(SPAN, argument)
    }

    pub fn object(self, properties: impl IntoIterator<Item = ObjectPropertyKind<'a>>) -> Expression<'a> {
        self.ast.expression_object(SPAN, self.ast.vec_from_iter(properties))
    }

    pub fn array(self, items: impl IntoIterator<Item = Expression<'a>>) -> Expression<'a> {
        let elements = items.into_iter().map(ArrayExpressionElement::from);
        self.ast.expression_array(SPAN, self.ast.vec_from_iter(elements))
    }

    /// A template literal. Adjacent text parts are merged.
    pub fn template(self, parts: Vec<TemplatePart<'a>>) -> Expression<'a> {
        let mut quasis = self.ast.vec();
        let mut expressions = self.ast.vec();
        let mut text = String::new();
        for part in parts {
            match part {
                TemplatePart::Text(t) => text.push_str(&t),
                TemplatePart::Expr(e) => {
                    quasis.push(self.quasi(&text, false));
                    expressions.push(e);
                    text.clear();
                }
            }
        }
        quasis.push(self.quasi(&text, true));
        self.ast.expression_template_literal(SPAN, quasis, expressions)
    }

    fn quasi(self, text: &str, tail: bool) -> oxc_ast::ast::TemplateElement<'a> {
        let value = TemplateElementValue {
            raw: self.ast.atom(&escape_template_text(text)),
            cooked: Some(self.ast.atom(text)),
        };
        self.ast.template_element(SPAN, value, tail)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FUNCTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn binding(self, name: &str) -> BindingPattern<'a> {
        self.ast.binding_pattern_binding_identifier(SPAN, self.ast.atom(name))
    }

    pub fn param(self, name: &str) -> FormalParameter<'a> {
        self.ast.plain_formal_parameter(SPAN, self.binding(name))
    }

    /// `name = default`.
    pub fn param_with_default(self, name: &str, default: Expression<'a>) -> FormalParameter<'a> {
        self.ast.formal_parameter(
            SPAN,
            self.ast.vec(),
            self.binding(name),
            NONE,
            Some(default),
            false,
            None,
            false,
            false,
        )
    }

    /// Parameter list with an optional trailing `...rest`.
    pub fn params(
        self,
        items: impl IntoIterator<Item = FormalParameter<'a>>,
        rest: Option<&str>,
    ) -> FormalParameters<'a> {
        self.parameters(FormalParameterKind::FormalParameter, items, rest)
    }

    fn parameters(
        self,
        kind: FormalParameterKind,
        items: impl IntoIterator<Item = FormalParameter<'a>>,
        rest: Option<&str>,
    ) -> FormalParameters<'a> {
        let rest = rest.map(|name| {
            let element = self.ast.binding_rest_element(SPAN, self.binding(name));
            self.ast.alloc(self.ast.formal_parameter_rest(SPAN, element, NONE))
        });
        self.ast
            .formal_parameters(SPAN, kind, self.ast.vec_from_iter(items), rest)
    }

    fn arrow_params(self, names: &[&str]) -> FormalParameters<'a> {
        self.parameters(
            FormalParameterKind::ArrowFormalParameters,
            names.iter().map(|n| self.param(n)),
            None,
        )
    }

    /// `(names) => body`.
    pub fn arrow(self, names: &[&str], body: Expression<'a>) -> Expression<'a> {
        let statements = self.ast.vec1(self.expr_stmt(body));
        let body = self.ast.function_body(SPAN, self.ast.vec(), statements);
        self.ast
            .expression_arrow_function(SPAN, true, false, NONE, self.arrow_params(names), NONE, body)
    }

    /// `(names) => { statements }`.
    pub fn arrow_block(
        self,
        names: &[&str],
        statements: impl IntoIterator<Item = Statement<'a>>,
    ) -> Expression<'a> {
        let body = self
            .ast
            .function_body(SPAN, self.ast.vec(), self.ast.vec_from_iter(statements));
        self.ast
            .expression_arrow_function(SPAN, false, false, NONE, self.arrow_params(names), NONE, body)
    }

    pub fn function_declaration(
        self,
        name: &str,
        params: FormalParameters<'a>,
        body: impl IntoIterator<Item = Statement<'a>>,
    ) -> Declaration<'a> {
        let body = self
            .ast
            .function_body(SPAN, self.ast.vec(), self.ast.vec_from_iter(body));
        self.ast.declaration_function(
            SPAN,
            FunctionType::FunctionDeclaration,
            Some(self.ast.binding_identifier(SPAN, self.ast.atom(name))),
            false,
            false,
            false,
            NONE,
            NONE,
            params,
            NONE,
            Some(body),
        )
    }

    pub fn function(
        self,
        name: &str,
        params: FormalParameters<'a>,
        body: impl IntoIterator<Item = Statement<'a>>,
    ) -> Statement<'a> {
        Statement::from(self.function_declaration(name, params, body))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn expr_stmt(self, expr: Expression<'a>) -> Statement<'a> {
        self.ast.statement_expression(SPAN, expr)
    }

    pub fn const_declaration(self, name: &str, init: Expression<'a>) -> Declaration<'a> {
        let kind = VariableDeclarationKind::Const;
        let declarator = self
            .ast
            .variable_declarator(SPAN, kind, self.binding(name), NONE, Some(init), false);
        self.ast
            .declaration_variable(SPAN, kind, self.ast.vec1(declarator), false)
    }

    pub fn const_decl(self, name: &str, init: Expression<'a>) -> Statement<'a> {
        Statement::from(self.const_declaration(name, init))
    }

    pub fn if_then(
        self,
        test: Expression<'a>,
        then: impl IntoIterator<Item = Statement<'a>>,
    ) -> Statement<'a> {
        let block = self.ast.statement_block(SPAN, self.ast.vec_from_iter(then));
        self.ast.statement_if(SPAN, test, block, None)
    }

    pub fn ret(self, value: Expression<'a>) -> Statement<'a> {
        self.ast.statement_return(SPAN, Some(value))
    }

    /// `for (const binding of iterable) { body }`.
    pub fn for_of_const(
        self,
        binding: &str,
        iterable: Expression<'a>,
        body: impl IntoIterator<Item = Statement<'a>>,
    ) -> Statement<'a> {
        let kind = VariableDeclarationKind::Const;
        let declarator = self
            .ast
            .variable_declarator(SPAN, kind, self.binding(binding), NONE, None, false);
        let left = self
            .ast
            .for_statement_left_variable_declaration(SPAN, kind, self.ast.vec1(declarator), false);
        let body = self.ast.statement_block(SPAN, self.ast.vec_from_iter(body));
        self.ast.statement_for_of(SPAN, false, left, iterable, body)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MODULE ITEMS
    // ═══════════════════════════════════════════════════════════════════════════

    /// `import { names } from "source";`
    pub fn import_named(self, names: &[&str], source: &str) -> Statement<'a> {
        let specifiers = self.ast.vec_from_iter(names.iter().map(|name| {
            self.ast.import_declaration_specifier_import_specifier(
                SPAN,
                self.ast.module_export_name_identifier_name(SPAN, self.ast.atom(name)),
                self.ast.binding_identifier(SPAN, self.ast.atom(name)),
                ImportOrExportKind::Value,
            )
        }));
        let source = self.ast.string_literal(SPAN, self.ast.atom(source), None);
        Statement::from(self.ast.module_declaration_import_declaration(
            SPAN,
            Some(specifiers),
            source,
            None,
            NONE,
            ImportOrExportKind::Value,
        ))
    }

    pub fn export_named(self, declaration: Declaration<'a>) -> Statement<'a> {
        Statement::from(self.ast.module_declaration_export_named_declaration(
            SPAN,
            Some(declaration),
            self.ast.vec(),
            None,
            ImportOrExportKind::Value,
            NONE,
        ))
    }

    pub fn export_default_function(
        self,
        name: &str,
        params: FormalParameters<'a>,
        body: impl IntoIterator<Item = Statement<'a>>,
    ) -> Statement<'a> {
        let body = self
            .ast
            .function_body(SPAN, self.ast.vec(), self.ast.vec_from_iter(body));
        let function = self.ast.export_default_declaration_kind_function_declaration(
            SPAN,
            FunctionType::FunctionDeclaration,
            Some(self.ast.binding_identifier(SPAN, self.ast.atom(name))),
            false,
            false,
            false,
            NONE,
            NONE,
            params,
            NONE,
            Some(body),
        );
        Statement::from(self.ast.module_declaration_export_default_declaration(SPAN, function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(code: &str) -> String {
        code.split_whitespace().collect()
    }

    #[test]
    fn test_template_escaping() {
        let allocator = Allocator::default();
        let js = JsBuilder::new(&allocator);
        let expr = js.template(vec![
            TemplatePart::Text("a`b\\c ${d} $e".into()),
            TemplatePart::Expr(js.ident("x")),
        ]);
        assert_eq!(js.print_expression(expr), "`a\\`b\\\\c \\${d} $e${x}`");
    }

    #[test]
    fn test_template_merges_text_and_keeps_cooked_value() {
        let allocator = Allocator::default();
        let js = JsBuilder::new(&allocator);
        let expr = js.template(vec![
            TemplatePart::Text("<p>".into()),
            TemplatePart::Text("`".into()),
            TemplatePart::Expr(js.ident("a")),
            TemplatePart::Expr(js.ident("b")),
        ]);
        let Expression::TemplateLiteral(literal) = &expr else {
            panic!("expected a template literal");
        };
        assert_eq!(literal.quasis.len(), 3);
        assert_eq!(literal.expressions.len(), 2);
        assert_eq!(literal.quasis[0].value.cooked.as_ref().map(|c| c.as_str()), Some("<p>`"));
        assert_eq!(literal.quasis[0].value.raw.as_str(), "<p>\\`");
        assert!(literal.quasis[2].tail);
    }

    #[test]
    fn test_operand_precedence_is_printed() {
        let allocator = Allocator::default();
        let js = JsBuilder::new(&allocator);
        let source = js.parse_expression("a || b").unwrap();
        let expr = js.method(source, "map", []);
        assert_eq!(squash(&js.print_expression(expr)), "(a||b).map()");
    }

    #[test]
    fn test_object_keys_and_spread() {
        let allocator = Allocator::default();
        let js = JsBuilder::new(&allocator);
        let object = js.object([
            js.spread_property(js.ident("p")),
            js.property("a", js.boolean(true)),
            js.property("data-x", js.null()),
        ]);
        let expr = js.call(js.ident("f"), [object]);
        assert_eq!(squash(&js.print_expression(expr)), "f({...p,a:true,\"data-x\":null})");
    }

    #[test]
    fn test_json_literal() {
        let allocator = Allocator::default();
        let js = JsBuilder::new(&allocator);
        let value = serde_json::json!({ "name": "n", "list": [1, -2, true, null], "data-id": {} });
        let code = squash(&js.print_expression(js.call(js.ident("f"), [js.json(&value)])));
        assert!(code.contains("name:\"n\""));
        assert!(code.contains("list:[1,-2,true,null]"));
        assert!(code.contains("\"data-id\":{}"));
    }

    #[test]
    fn test_exported_function_and_parse_errors() {
        let allocator = Allocator::default();
        let js = JsBuilder::new(&allocator);
        let body = [
            js.if_then(js.ident("a"), [js.ret(js.boolean(true))]),
            js.ret(js.null()),
        ];
        let function = js.function_declaration("f", js.params([js.param("a")], Some("rest")), body);
        let code = js.print(js.ast.vec1(js.export_named(function)));
        assert_eq!(
            squash(&code),
            "exportfunctionf(a,...rest){if(a){returntrue;}returnnull;}"
        );

        assert!(js.parse_expression("a +").is_err());
        assert!(js.parse_statements("let = ;").is_err());
        assert_eq!(js.parse_statements("let a = 1; a++").unwrap().len(), 2);
    }
}
