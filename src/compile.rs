//! The compile pipeline and module assembly.

use oxc_allocator::{Allocator, Vec as ArenaVec};
use oxc_ast::ast::{Expression, Statement};
use oxc_span::SPAN;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::component::{extract_metadata, ComponentMetadata};
use crate::diagnostic::{CompilerError, DiagnosticSink, Locator, LogSink, E_INVALID_JAVASCRIPT};
use crate::directives::{build_tree, tokenize, validate_blocks};
use crate::discovery::find_component_files;
use crate::generators::{event_emitter, props_defaults, props_validation, slot_renderer};
use crate::js::JsBuilder;
use crate::rewrite::{rewrite_script, Renames};
use crate::scan::is_identifier;
use crate::script::analyze_script;
use crate::sections::split_sections;
use crate::style::{compile_style, scope_class};
use crate::template::TemplateContext;

/// Specifier generated modules import the runtime from, unless overridden.
pub const DEFAULT_RUNTIME_MODULE: &str = "aspc/runtime";

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS & RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Overrides the name derived from `file`.
    pub component_name: Option<String>,
    /// Server rendering: effect registrations are left out.
    pub ssr: bool,
    /// Append the hot-module-replacement footer.
    pub hmr: bool,
    /// Path used in diagnostics and for the derived component name.
    pub file: Option<String>,
    /// Drops `validateProps` and the undeclared-event warning.
    pub production: bool,
    pub runtime_module: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            component_name: None,
            ssr: false,
            hmr: false,
            file: None,
            production: false,
            runtime_module: DEFAULT_RUNTIME_MODULE.to_string(),
        }
    }
}

impl CompileOptions {
    pub fn file_name(&self) -> &str {
        self.file.as_deref().unwrap_or("Component.aspc")
    }

    /// The explicit `componentName`, or the file stem in PascalCase.
    pub fn resolved_component_name(&self) -> String {
        if let Some(name) = self.component_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return pascal_case(name);
        }
        let stem = Path::new(self.file_name())
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Component");
        pascal_case(stem)
    }
}

fn pascal_case(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for word in raw.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$')) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.push(first.to_ascii_uppercase());
            name.extend(chars);
        }
    }
    if name.is_empty() {
        return "Component".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub code: String,
    pub name: String,
    pub scope_id: String,
    pub metadata: ComponentMetadata,
    /// Scoped stylesheet, when the component has styles.
    pub styles: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile a component source to an ES module. Errors are logged before they
/// are returned.
pub fn compile(source: &str, options: &CompileOptions) -> Result<String, CompilerError> {
    compile_with_sink(source, options, &LogSink)
}

pub fn compile_with_sink(
    source: &str,
    options: &CompileOptions,
    sink: &dyn DiagnosticSink,
) -> Result<String, CompilerError> {
    compile_component(source, options, sink).map(|result| result.code)
}

/// Full pipeline, returning the module together with what was extracted.
pub fn compile_component(
    source: &str,
    options: &CompileOptions,
    sink: &dyn DiagnosticSink,
) -> Result<CompileResult, CompilerError> {
    run_pipeline(source, options).inspect_err(|err| sink.report(err))
}

fn run_pipeline(source: &str, options: &CompileOptions) -> Result<CompileResult, CompilerError> {
    let file = options.file_name();
    let name = options.resolved_component_name();

    let sections = split_sections(source, file)?;
    log::debug!(
        "[aspc] {}: sections script={}B template={}B style={}B",
        file,
        sections.script.content.len(),
        sections.template.content.len(),
        sections.style.content.len()
    );

    let template_loc = Locator::new(file, source, sections.template.offset);
    let tokens = tokenize(&sections.template.content, &template_loc)?;
    validate_blocks(&tokens, &template_loc)?;
    log::debug!("[aspc] {}: {} template tokens, blocks balanced", file, tokens.len());

    let metadata = extract_metadata(&sections.script.content, &tokens, &template_loc)?;
    log::debug!(
        "[aspc] {}: {} props, {} emits, {} slots",
        file,
        metadata.props.len(),
        metadata.emits.len(),
        metadata.slots.names().len()
    );

    let script = analyze_script(&sections.script.content);
    log::debug!(
        "[aspc] {}: {} states, {} computeds, {} effects",
        file,
        script.states.len(),
        script.computeds.len(),
        script.effects.len()
    );

    let mut renames = Renames::new();
    for cell in script.cell_names() {
        renames.add_cell(cell);
    }
    for prop in metadata.props.iter().filter(|p| is_identifier(&p.name)) {
        renames.add_prop(&prop.name);
    }

    let nodes = build_tree(tokens, &template_loc)?;
    let states: BTreeSet<String> = script.states.iter().map(|s| s.name.clone()).collect();

    let scope_id = scope_class(&name);
    let styles = if sections.style.is_empty() {
        None
    } else {
        let style_loc = Locator::new(file, source, sections.style.offset);
        Some(compile_style(
            &sections.style.content,
            sections.style.lang(),
            &scope_id,
            &style_loc,
        )?)
    };

    let allocator = Allocator::default();
    let js = JsBuilder::new(&allocator);
    let context = TemplateContext {
        states: &states,
        loc: template_loc,
        js,
    };
    let render = context.compile(&nodes, &renames, styles.as_ref().map(|_| scope_id.as_str()))?;
    log::debug!("[aspc] {}: render expression built", file);

    let lowered = if options.ssr {
        &script.server_lowered
    } else {
        &script.lowered
    };
    let body = rewrite_script(lowered, &renames);

    let module = assemble_module(
        js,
        &ModuleParts {
            name: &name,
            scope_id: &scope_id,
            options,
            metadata: &metadata,
            imports: &script.imports,
            script: &body,
            styles: styles.as_deref(),
            loc: Locator::new(file, source, sections.script.offset),
        },
        render,
    )?;
    let code = js.print(module);
    log::debug!("[aspc] {}: emitted {} bytes", file, code.len());

    Ok(CompileResult {
        code,
        name,
        scope_id,
        metadata,
        styles,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE ASSEMBLY
// ═══════════════════════════════════════════════════════════════════════════════

struct ModuleParts<'p> {
    name: &'p str,
    scope_id: &'p str,
    options: &'p CompileOptions,
    metadata: &'p ComponentMetadata,
    imports: &'p [String],
    /// Lowered and rewritten script body.
    script: &'p str,
    styles: Option<&'p str>,
    /// Locates script errors at the start of the script section.
    loc: Locator<'p>,
}

impl ModuleParts<'_> {
    fn script_error(&self, what: &str, err: &str) -> CompilerError {
        self.loc.error(
            E_INVALID_JAVASCRIPT,
            &format!("{} is not valid JavaScript: {}", what, err),
            0,
        )
    }
}

fn runtime_import<'a>(js: JsBuilder<'a>, parts: &ModuleParts) -> Statement<'a> {
    let mut names = vec!["$state", "$computed", "$effect"];
    if parts.script.contains("$global") {
        names.push("$global");
    }
    js.import_named(&names, &parts.options.runtime_module)
}

fn json_literal<'a, T: Serialize>(js: JsBuilder<'a>, value: &T) -> Expression<'a> {
    js.json(&serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
}

fn factory<'a>(
    js: JsBuilder<'a>,
    parts: &ModuleParts,
    render: Expression<'a>,
) -> Result<Statement<'a>, CompilerError> {
    let production = parts.options.production;
    let mut body = vec![js.const_decl("props", js.object([js.spread_property(js.ident("$$props"))]))];
    let defaults = props_defaults(js, &parts.metadata.props).map_err(|(name, err)| {
        parts.script_error(&format!("the default of prop \"{}\"", name), &err)
    })?;
    body.extend(defaults);
    if !production {
        body.push(js.expr_stmt(js.call(js.ident("validateProps"), [js.ident("props")])));
    }
    body.extend(event_emitter(js, &parts.metadata.emits, production));
    if !parts.metadata.slots.is_empty() {
        body.push(slot_renderer(js));
    }
    if !parts.script.trim().is_empty() {
        let script = js
            .parse_statements(parts.script)
            .map_err(|err| parts.script_error("the component script", &err))?;
        body.extend(script);
    }
    body.push(js.function("render", js.params([], None), [js.ret(render)]));

    let slots = js.array(parts.metadata.slots.names().iter().map(|n| js.string(n)));
    body.push(js.ret(js.object([
        js.property("render", js.ident("render")),
        js.property("emit", js.ident("emit")),
        js.property("on", js.ident("on")),
        js.property("slots", slots),
    ])));

    let params = js.params(
        [
            js.param_with_default("$$props", js.object([])),
            js.param_with_default("$$slots", js.object([])),
        ],
        None,
    );
    Ok(js.export_default_function(parts.name, params, body))
}

fn component_info<'a>(js: JsBuilder<'a>, parts: &ModuleParts) -> Statement<'a> {
    let info = js.object([
        js.property("name", js.string(parts.name)),
        js.property("scopeId", js.string(parts.scope_id)),
        js.property("props", json_literal(js, &parts.metadata.props)),
        js.property("emits", json_literal(js, &parts.metadata.emits)),
        js.property("slots", json_literal(js, &parts.metadata.slots)),
        js.property("ssr", js.boolean(parts.options.ssr)),
    ]);
    js.expr_stmt(js.assign(js.static_member(js.ident(parts.name), "__aspc"), info))
}

fn hmr_footer(js: JsBuilder<'_>) -> Statement<'_> {
    let hot = || {
        let meta = js.ast.expression_meta_property(
            SPAN,
            js.ast.identifier_name(SPAN, "import"),
            js.ast.identifier_name(SPAN, "meta"),
        );
        js.member(meta, "hot")
    };
    js.if_then(hot(), [js.expr_stmt(js.method(hot(), "accept", []))])
}

fn assemble_module<'a>(
    js: JsBuilder<'a>,
    parts: &ModuleParts,
    render: Expression<'a>,
) -> Result<ArenaVec<'a, Statement<'a>>, CompilerError> {
    let mut module = vec![runtime_import(js, parts)];
    for import in parts.imports {
        let statements = js
            .parse_statements(import)
            .map_err(|err| parts.script_error(&format!("import `{}`", import.trim()), &err))?;
        module.extend(statements);
    }

    if let Some(css) = parts.styles {
        module.push(js.export_named(js.const_declaration("styles", js.string(css))));
    }
    if !parts.options.production {
        module.push(props_validation(js, &parts.metadata.props));
    }
    module.push(factory(js, parts, render)?);
    module.push(component_info(js, parts));
    if parts.options.hmr {
        module.push(hmr_footer(js));
    }
    Ok(js.ast.vec_from_iter(module))
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles independent inputs in parallel. Results keep the input order.
pub fn compile_many(inputs: &[(String, CompileOptions)]) -> Vec<Result<String, CompilerError>> {
    inputs
        .par_iter()
        .map(|(source, options)| compile(source, options))
        .collect()
}

#[derive(Debug)]
pub struct CompiledFile {
    pub path: PathBuf,
    pub result: Result<String, CompilerError>,
}

/// Discovers every `.aspc` file under `dir` and compiles them in parallel.
/// Each file gets `options` with its own path and a name derived from it.
pub fn compile_dir(dir: &Path, options: &CompileOptions) -> std::io::Result<Vec<CompiledFile>> {
    let files = find_component_files(dir);
    log::debug!("[aspc] discovered {} components under {}", files.len(), dir.display());

    let sources = files
        .iter()
        .map(fs::read_to_string)
        .collect::<std::io::Result<Vec<String>>>()?;

    Ok(files
        .into_par_iter()
        .zip(sources.into_par_iter())
        .map(|(path, source)| {
            let file_options = CompileOptions {
                file: Some(path.to_string_lossy().to_string()),
                component_name: None,
                ..options.clone()
            };
            let result = compile(&source, &file_options);
            CompiledFile { path, result }
        })
        .collect())
}
