//! Script section lowering.
//!
//! Recognises the script mini-syntax (`$state`, `$:` computed and effect
//! lines, `props`/`emits` exports, imports) and produces descriptors plus a
//! lowered body in which every construct is replaced by its runtime call.
//! Identifier rewriting of the lowered body happens afterwards, once the prop
//! names are known.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::scan::{find_matching, statement_end};

lazy_static! {
    static ref STATE_DECL_RE: Regex =
        Regex::new(r"\b(?:let|const|var)\s+([A-Za-z_$][\w$]*)\s*=\s*\$state\s*\(").unwrap();
    static ref REACTIVE_LINE_RE: Regex = Regex::new(r"(?m)^[ \t]*\$:[ \t]*").unwrap();
    static ref EFFECT_CALL_RE: Regex = Regex::new(r"^effect\s*\(").unwrap();
    static ref COMPUTED_HEAD_RE: Regex = Regex::new(r"^([A-Za-z_$][\w$]*)\s*=").unwrap();
    static ref METADATA_EXPORT_RE: Regex =
        Regex::new(r"(?m)^[ \t]*export\s+const\s+(props|emits)\s*=\s*").unwrap();
    static ref IMPORT_RE: Regex = Regex::new(r"(?m)^[ \t]*import\b").unwrap();
    static ref EXPORT_KEYWORD_RE: Regex = Regex::new(r"(?m)^([ \t]*)export\s+(?:default\s+)?").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDescriptor {
    pub name: String,
    pub initial_expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedDescriptor {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDescriptor {
    pub body_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptAnalysis {
    pub states: Vec<StateDescriptor>,
    pub computeds: Vec<ComputedDescriptor>,
    pub effects: Vec<EffectDescriptor>,
    /// Import statements hoisted to module scope, verbatim.
    pub imports: Vec<String>,
    /// Script with every construct lowered, not yet identifier-rewritten.
    pub lowered: String,
    /// `lowered` without effect registrations, for server rendering.
    pub server_lowered: String,
}

impl ScriptAnalysis {
    /// State and computed names, in declaration order.
    pub fn cell_names(&self) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.computeds.iter().map(|c| c.name.as_str()))
    }

    pub fn is_state(&self, name: &str) -> bool {
        self.states.iter().any(|s| s.name == name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// Extends `end` over a directly following `;`.
fn eat_semicolon(script: &str, end: usize) -> usize {
    let rest = &script[end..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    if trimmed.starts_with(';') {
        end + (rest.len() - trimmed.len()) + 1
    } else {
        end
    }
}

enum Reactive {
    Computed(ComputedDescriptor),
    Effect(EffectDescriptor),
}

fn lower_reactive_line(script: &str, line_start: usize, body_start: usize) -> Option<(Reactive, Edit)> {
    let rest = &script[body_start..];

    if EFFECT_CALL_RE.is_match(rest) {
        let open = body_start + rest.find('(')?;
        let close = find_matching(script, open)?;
        let argument = script[open + 1..close].trim().to_string();
        let end = eat_semicolon(script, close + 1);
        return Some((
            Reactive::Effect(EffectDescriptor {
                body_text: argument.clone(),
            }),
            Edit {
                start: line_start,
                end,
                replacement: format!("$effect({});", argument),
            },
        ));
    }

    if let Some(caps) = COMPUTED_HEAD_RE.captures(rest) {
        let head = caps.get(0)?;
        // `$: a == b` is a statement, not an assignment
        if !rest[head.end()..].starts_with('=') {
            let name = caps[1].to_string();
            let expr_start = body_start + head.end();
            let expr_end = statement_end(script, expr_start);
            let expression = script[expr_start..expr_end].trim().to_string();
            let end = eat_semicolon(script, expr_end);
            let replacement = format!("const {} = $computed(() => ({}));", name, expression);
            return Some((
                Reactive::Computed(ComputedDescriptor { name, expression }),
                Edit {
                    start: line_start,
                    end,
                    replacement,
                },
            ));
        }
    }

    let (statement, end) = if rest.starts_with('{') {
        let close = find_matching(script, body_start)?;
        (script[body_start..=close].to_string(), close + 1)
    } else {
        let stmt_end = statement_end(script, body_start);
        let stmt = script[body_start..stmt_end].trim().trim_end_matches(';').to_string();
        (format!("() => {{ {}; }}", stmt), eat_semicolon(script, stmt_end))
    };
    let argument = if statement.starts_with('{') {
        format!("() => {}", statement)
    } else {
        statement
    };
    Some((
        Reactive::Effect(EffectDescriptor {
            body_text: argument.clone(),
        }),
        Edit {
            start: line_start,
            end,
            replacement: format!("$effect({});", argument),
        },
    ))
}

/// Analyse and lower a script section.
pub fn analyze_script(script: &str) -> ScriptAnalysis {
    let mut analysis = ScriptAnalysis::default();
    let mut edits: Vec<(usize, Edit, Option<Reactive>, Option<StateDescriptor>)> = Vec::new();

    for m in IMPORT_RE.find_iter(script) {
        let end = eat_semicolon(script, statement_end(script, m.start()));
        let text = script[m.start()..end].trim().to_string();
        analysis.imports.push(text);
        edits.push((
            m.start(),
            Edit {
                start: m.start(),
                end,
                replacement: String::new(),
            },
            None,
            None,
        ));
    }

    for caps in METADATA_EXPORT_RE.captures_iter(script) {
        let whole = caps.get(0).unwrap();
        let open = whole.end();
        let expected = if &caps[1] == "props" { "{" } else { "[" };
        if !script[open..].starts_with(expected) {
            continue;
        }
        // Unbalanced literals stay in place; the extractor reports them as absent.
        if let Some(close) = find_matching(script, open) {
            let end = eat_semicolon(script, close + 1);
            edits.push((
                whole.start(),
                Edit {
                    start: whole.start(),
                    end,
                    replacement: String::new(),
                },
                None,
                None,
            ));
        }
    }

    for caps in STATE_DECL_RE.captures_iter(script) {
        let whole = caps.get(0).unwrap();
        let open = whole.end() - 1;
        let Some(close) = find_matching(script, open) else {
            continue;
        };
        let name = caps[1].to_string();
        let initial = script[open + 1..close].trim().to_string();
        let initial = if initial.is_empty() {
            "undefined".to_string()
        } else {
            initial
        };
        let end = eat_semicolon(script, close + 1);
        edits.push((
            whole.start(),
            Edit {
                start: whole.start(),
                end,
                replacement: format!("const {} = $state({});", name, initial),
            },
            None,
            Some(StateDescriptor {
                name,
                initial_expression: initial,
            }),
        ));
    }

    for m in REACTIVE_LINE_RE.find_iter(script) {
        if let Some((reactive, edit)) = lower_reactive_line(script, m.start(), m.end()) {
            edits.push((m.start(), edit, Some(reactive), None));
        } else {
            log::warn!("[aspc] could not lower reactive statement at byte {}", m.start());
        }
    }

    edits.sort_by_key(|(start, ..)| *start);

    let mut lowered = String::with_capacity(script.len());
    let mut server = String::with_capacity(script.len());
    let mut copied = 0;
    for (_, edit, reactive, state) in edits {
        if edit.start < copied {
            // nested inside an earlier construct, e.g. `$state` inside `$:`
            continue;
        }
        lowered.push_str(&script[copied..edit.start]);
        lowered.push_str(&edit.replacement);
        server.push_str(&script[copied..edit.start]);
        if !matches!(reactive, Some(Reactive::Effect(_))) {
            server.push_str(&edit.replacement);
        }
        copied = edit.end;
        if let Some(state) = state {
            analysis.states.push(state);
        }
        match reactive {
            Some(Reactive::Computed(c)) => analysis.computeds.push(c),
            Some(Reactive::Effect(e)) => analysis.effects.push(e),
            None => {}
        }
    }
    lowered.push_str(&script[copied..]);
    server.push_str(&script[copied..]);

    // Remaining exports cannot live inside the factory function.
    analysis.lowered = EXPORT_KEYWORD_RE.replace_all(&lowered, "$1").trim().to_string();
    analysis.server_lowered = EXPORT_KEYWORD_RE.replace_all(&server, "$1").trim().to_string();
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_declarations() {
        let a = analyze_script("let count = $state(0)\nconst items = $state([1, 2]);");
        assert_eq!(
            a.states,
            vec![
                StateDescriptor {
                    name: "count".into(),
                    initial_expression: "0".into()
                },
                StateDescriptor {
                    name: "items".into(),
                    initial_expression: "[1, 2]".into()
                },
            ]
        );
        assert_eq!(
            a.lowered,
            "const count = $state(0);\nconst items = $state([1, 2]);"
        );
    }

    #[test]
    fn test_computed_line() {
        let a = analyze_script("let count = $state(1)\n$: doubled = count * 2\n");
        assert_eq!(a.computeds.len(), 1);
        assert_eq!(a.computeds[0].name, "doubled");
        assert_eq!(a.computeds[0].expression, "count * 2");
        assert!(a
            .lowered
            .contains("const doubled = $computed(() => (count * 2));"));
    }

    #[test]
    fn test_effect_block() {
        let src = "$: effect(() => {\n  console.log(count)\n})\nfunction f() {}";
        let a = analyze_script(src);
        assert_eq!(a.effects.len(), 1);
        assert_eq!(a.effects[0].body_text, "() => {\n  console.log(count)\n}");
        assert!(a.lowered.starts_with("$effect(() => {\n  console.log(count)\n});"));
        assert!(a.lowered.ends_with("function f() {}"));
    }

    #[test]
    fn test_plain_reactive_statement_becomes_effect() {
        let a = analyze_script("$: console.log(count)");
        assert_eq!(a.effects.len(), 1);
        assert_eq!(a.lowered, "$effect(() => { console.log(count); });");
    }

    #[test]
    fn test_comparison_is_not_computed() {
        let a = analyze_script("$: a == b && go()");
        assert!(a.computeds.is_empty());
        assert_eq!(a.effects.len(), 1);
    }

    #[test]
    fn test_metadata_exports_removed() {
        let src = "export const props = { a: { type: String } };\nexport const emits = ['x'];\nlet n = $state(0)";
        let a = analyze_script(src);
        assert_eq!(a.lowered, "const n = $state(0);");
    }

    #[test]
    fn test_imports_hoisted() {
        let src = "import { fmt } from './fmt.js';\nimport {\n  a,\n  b\n} from 'lib'\nlet n = $state(0)";
        let a = analyze_script(src);
        assert_eq!(a.imports.len(), 2);
        assert_eq!(a.imports[0], "import { fmt } from './fmt.js';");
        assert!(a.imports[1].contains("from 'lib'"));
        assert_eq!(a.lowered, "const n = $state(0);");
    }

    #[test]
    fn test_other_exports_lose_keyword() {
        let a = analyze_script("export function reset() {}");
        assert_eq!(a.lowered, "function reset() {}");
    }

    #[test]
    fn test_server_lowering_drops_effects() {
        let a = analyze_script("let n = $state(1)\n$: doubled = n * 2\n$: console.log(n)");
        assert!(a.lowered.contains("$effect("));
        assert!(!a.server_lowered.contains("$effect("));
        assert!(a.server_lowered.contains("const doubled = $computed(() => (n * 2));"));
        assert_eq!(a.effects.len(), 1);
    }
}
