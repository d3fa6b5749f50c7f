//! Identifier rewriting for reactive bindings.
//!
//! Free references to state and computed names become `name.value`; prop
//! names become `props.name`. References are found with oxc so member
//! properties, object keys and string contents are never touched. Names bound
//! by an enclosing function, arrow, block, loop head or catch clause shadow
//! the reactive binding; only the scopes that actually declare a name do.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, BindingIdentifier, BindingPattern, BlockStatement, CatchClause,
    Expression, ForInStatement, ForOfStatement, ForStatement, ForStatementInit, ForStatementLeft,
    FormalParameters, Function, FunctionType, IdentifierReference, ObjectProperty, Statement,
    SwitchStatement, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::scope::ScopeFlags;
use std::collections::{BTreeMap, HashSet};

use crate::scan::skip_non_code;

/// Name → replacement text for every reactive identifier in scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Renames {
    map: BTreeMap<String, String>,
}

impl Renames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state or computed cell: `name` → `name.value`.
    pub fn add_cell(&mut self, name: &str) {
        self.map.insert(name.to_string(), format!("{}.value", name));
    }

    /// Register a prop: `name` → `props.name`. Cells take priority.
    pub fn add_prop(&mut self, name: &str) {
        self.map
            .entry(name.to_string())
            .or_insert_with(|| format!("props.{}", name));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A copy with `names` removed, for loop bodies binding item/index.
    pub fn without<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Renames {
        let mut copy = self.clone();
        for name in names {
            copy.map.remove(name);
        }
        copy
    }
}

fn source_type() -> SourceType {
    SourceType::default()
        .with_typescript(true)
        .with_module(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Names bound by a pattern or parameter list. Functions in default values
/// are their own scope and are not entered.
struct PatternNames<'s> {
    names: &'s mut HashSet<String>,
}

impl<'a, 's> Visit<'a> for PatternNames<'s> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names.insert(ident.name.to_string());
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}
}

/// `var` declarations anywhere in a function body, which hoist to the
/// function scope. Nested functions are not entered.
struct HoistedVars<'s> {
    names: &'s mut HashSet<String>,
}

impl<'a, 's> Visit<'a> for HoistedVars<'s> {
    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        if decl.kind == VariableDeclarationKind::Var {
            for declarator in &decl.declarations {
                pattern_names(&declarator.id, self.names);
            }
        }
        walk::walk_variable_declaration(self, decl);
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}
}

fn pattern_names(pattern: &BindingPattern, names: &mut HashSet<String>) {
    PatternNames { names }.visit_binding_pattern(pattern);
}

fn declaration_names(decl: &VariableDeclaration, names: &mut HashSet<String>) {
    for declarator in &decl.declarations {
        pattern_names(&declarator.id, names);
    }
}

/// `let`, `const`, `class` and function declarations directly in `statements`.
fn lexical_names(statements: &[Statement], names: &mut HashSet<String>) {
    for stmt in statements {
        match stmt {
            Statement::VariableDeclaration(decl) if decl.kind != VariableDeclarationKind::Var => {
                declaration_names(decl, names);
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    names.insert(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    names.insert(id.name.to_string());
                }
            }
            _ => {}
        }
    }
}

/// Everything a function body binds: parameters, hoisted `var`s and its
/// top-level lexical declarations.
fn function_scope(params: &FormalParameters, statements: &[Statement]) -> HashSet<String> {
    let mut names = HashSet::new();
    PatternNames { names: &mut names }.visit_formal_parameters(params);
    {
        let mut hoisted = HoistedVars { names: &mut names };
        for stmt in statements {
            hoisted.visit_statement(stmt);
        }
    }
    lexical_names(statements, &mut names);
    names
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWRITER
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects replacements for free references. The program's top level is
/// not a shadowing scope: its declarations are the reactive cells.
struct ReferenceRewriter<'r> {
    renames: &'r Renames,
    shadowed: Vec<HashSet<String>>,
    replacements: Vec<(u32, u32, String)>,
}

impl<'r> ReferenceRewriter<'r> {
    fn new(renames: &'r Renames) -> Self {
        ReferenceRewriter {
            renames,
            shadowed: Vec::new(),
            replacements: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'r str> {
        if self.shadowed.iter().any(|scope| scope.contains(name)) {
            return None;
        }
        self.renames.get(name)
    }

    fn scoped(&mut self, names: HashSet<String>, walk: impl FnOnce(&mut Self)) {
        if names.is_empty() {
            walk(self);
            return;
        }
        self.shadowed.push(names);
        walk(self);
        self.shadowed.pop();
    }
}

impl<'a, 'r> Visit<'a> for ReferenceRewriter<'r> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(replacement) = self.lookup(ident.name.as_str()) {
            self.replacements
                .push((ident.span.start, ident.span.end, replacement.to_string()));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if let Some(replacement) = self.lookup(ident.name.as_str()) {
                    self.replacements.push((
                        prop.span.start,
                        prop.span.end,
                        format!("{}: {}", ident.name.as_str(), replacement),
                    ));
                    return;
                }
            }
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let statements = func.body.as_ref().map(|b| b.statements.as_slice()).unwrap_or(&[]);
        let mut names = function_scope(&func.params, statements);
        // a function expression's own name is visible only inside it
        if func.r#type == FunctionType::FunctionExpression {
            if let Some(id) = &func.id {
                names.insert(id.name.to_string());
            }
        }
        self.scoped(names, |this| walk::walk_function(this, func, flags));
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        let names = function_scope(&arrow.params, &arrow.body.statements);
        self.scoped(names, |this| walk::walk_arrow_function_expression(this, arrow));
    }

    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        let mut names = HashSet::new();
        lexical_names(&block.body, &mut names);
        self.scoped(names, |this| walk::walk_block_statement(this, block));
    }

    fn visit_switch_statement(&mut self, switch: &SwitchStatement<'a>) {
        let mut names = HashSet::new();
        for case in &switch.cases {
            lexical_names(&case.consequent, &mut names);
        }
        self.scoped(names, |this| walk::walk_switch_statement(this, switch));
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        let mut names = HashSet::new();
        if let Some(ForStatementInit::VariableDeclaration(decl)) = &stmt.init {
            if decl.kind != VariableDeclarationKind::Var {
                declaration_names(decl, &mut names);
            }
        }
        self.scoped(names, |this| walk::walk_for_statement(this, stmt));
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        let names = loop_left_names(&stmt.left);
        self.scoped(names, |this| walk::walk_for_in_statement(this, stmt));
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        let names = loop_left_names(&stmt.left);
        self.scoped(names, |this| walk::walk_for_of_statement(this, stmt));
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        let mut names = HashSet::new();
        if let Some(param) = &clause.param {
            pattern_names(&param.pattern, &mut names);
        }
        self.scoped(names, |this| walk::walk_catch_clause(this, clause));
    }
}

fn loop_left_names(left: &ForStatementLeft) -> HashSet<String> {
    let mut names = HashSet::new();
    if let ForStatementLeft::VariableDeclaration(decl) = left {
        if decl.kind != VariableDeclarationKind::Var {
            declaration_names(decl, &mut names);
        }
    }
    names
}

fn apply_replacements(code: &str, mut replacements: Vec<(u32, u32, String)>) -> String {
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = code.to_string();
    let mut last_start = usize::MAX;
    for (start, end, text) in replacements {
        let (start, end) = (start as usize, end as usize);
        if end > last_start || end > out.len() {
            continue;
        }
        out.replace_range(start..end, &text);
        last_start = start;
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrite a template expression (condition, interpolation, loop source,
/// handler). Falls back to statement parsing for handler bodies such as
/// `a++; save()`.
pub fn rewrite_expression(code: &str, renames: &Renames) -> String {
    if renames.is_empty() || code.trim().is_empty() {
        return code.to_string();
    }
    let allocator = Allocator::default();
    match Parser::new(&allocator, code, source_type()).parse_expression() {
        Ok(expr) => {
            let mut rewriter = ReferenceRewriter::new(renames);
            rewriter.visit_expression(&expr);
            apply_replacements(code, rewriter.replacements)
        }
        Err(_) => rewrite_script(code, renames),
    }
}

/// Rewrite a whole script body.
pub fn rewrite_script(code: &str, renames: &Renames) -> String {
    if renames.is_empty() || code.trim().is_empty() {
        return code.to_string();
    }
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type()).parse();
    if !ret.errors.is_empty() {
        log::warn!(
            "[aspc] script did not parse ({} errors), using word-boundary rewriting: {:?}",
            ret.errors.len(),
            ret.errors.first()
        );
        return rewrite_words(code, renames);
    }
    let mut rewriter = ReferenceRewriter::new(renames);
    rewriter.visit_program(&ret.program);
    apply_replacements(code, rewriter.replacements)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Word-boundary rewriting for code oxc cannot parse. Skips string literals,
/// comments and member accesses (`obj.name`).
pub fn rewrite_words(code: &str, renames: &Renames) -> String {
    let bytes = code.as_bytes();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;
    let mut copied = 0;
    while i < bytes.len() {
        if let Some(next) = skip_non_code(bytes, i) {
            i = next;
            continue;
        }
        let starts_word = is_ident_start(bytes[i]) && (i == 0 || !is_ident_char(bytes[i - 1]));
        if !starts_word {
            i += 1;
            continue;
        }
        let mut end = i;
        while end < bytes.len() && is_ident_char(bytes[end]) {
            end += 1;
        }
        let is_member = code[..i].trim_end().ends_with('.');
        if !is_member {
            if let Some(replacement) = renames.get(&code[i..end]) {
                out.push_str(&code[copied..i]);
                out.push_str(replacement);
                copied = end;
            }
        }
        i = end;
    }
    out.push_str(&code[copied..]);
    out
}
