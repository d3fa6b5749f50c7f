//! # aspc
//!
//! Compiler for `.aspc` single-file components plus the reactivity runtime
//! the generated code runs on.
//!
//! ## Pipeline
//!
//! 1. **Sections**: the source is split into script, template and style.
//! 2. **Directives**: the template is tokenized and `{#if}` / `{#for}` /
//!    `{#each}` blocks are checked for balance before anything is lowered.
//! 3. **Metadata**: props, emits and slots are extracted.
//! 4. **Script**: `$state`, `$:` computed and `$:` effect lines are lowered
//!    to runtime calls.
//! 5. **Template**: the directive tree becomes one render expression with
//!    reactive names rewritten (`count` → `count.value`, `title` →
//!    `props.title`).
//! 6. **Style**: the SCSS-lite pre-pass runs and every selector is scoped to
//!    the component's class.
//! 7. **Assembly**: generator fragments are joined into one statement tree
//!    and printed once.
//!
//! Compilation is pure and deterministic, so independent components can be
//! compiled in parallel ([`compile_many`], [`compile_dir`]).
//!
//! ## Runtime
//!
//! Generated modules import `$state`, `$computed` and `$effect` from the
//! module named by [`CompileOptions::runtime_module`]. Its source ships as
//! [`RUNTIME_MODULE_SOURCE`]. [`reactivity`] implements the same contract
//! natively.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod cache;
mod compile;
mod component;
mod diagnostic;
mod directives;
mod discovery;
mod generators;
mod js;
mod rewrite;
mod scan;
mod script;
mod sections;
mod style;
mod template;

pub mod reactivity;

#[cfg(test)]
mod compile_tests;

pub use cache::IncrementalCache;
pub use compile::{
    compile, compile_component, compile_dir, compile_many, compile_with_sink, CompileOptions,
    CompileResult, CompiledFile, DEFAULT_RUNTIME_MODULE,
};
pub use component::{ComponentMetadata, PropDescriptor, PropType, SlotInfo, SlotTable};
pub use diagnostic::{CollectingSink, CompilerError, DiagnosticSink, ErrorKind, LineIndex, LogSink};
pub use discovery::find_component_files;
pub use script::{analyze_script, ComputedDescriptor, EffectDescriptor, ScriptAnalysis, StateDescriptor};
pub use sections::{split_sections, Section, Sections};

/// The JavaScript runtime generated modules import.
pub const RUNTIME_MODULE_SOURCE: &str = include_str!("../runtime/aspc-runtime.js");

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// `compileNative(source, optionsJson?)`. Diagnostics surface as the error
/// reason, rendered.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_native(source: String, options_json: Option<String>) -> napi::Result<String> {
    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_str(&json).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => CompileOptions::default(),
    };
    compile(&source, &options).map_err(|e| napi::Error::from_reason(e.render()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn runtime_source_native() -> String {
    RUNTIME_MODULE_SOURCE.to_string()
}
