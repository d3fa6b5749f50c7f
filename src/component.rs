//! Component metadata: props and emits from the script, slots from the
//! template tokens.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::diagnostic::{CompilerError, Locator, E_INVALID_SLOT};
use crate::directives::{Token, TokenKind};
use crate::scan::{find_matching, find_top_level, is_identifier, split_top_level};

lazy_static! {
    static ref PROPS_EXPORT_RE: Regex = Regex::new(r"export\s+const\s+props\s*=\s*\{").unwrap();
    static ref EMITS_EXPORT_RE: Regex = Regex::new(r"export\s+const\s+emits\s*=\s*\[").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl PropType {
    pub fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "String" => Some(PropType::String),
            "Number" => Some(PropType::Number),
            "Boolean" => Some(PropType::Boolean),
            "Array" => Some(PropType::Array),
            "Object" => Some(PropType::Object),
            "Any" => Some(PropType::Any),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropType::String => "String",
            PropType::Number => "Number",
            PropType::Boolean => "Boolean",
            PropType::Array => "Array",
            PropType::Object => "Object",
            PropType::Any => "Any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub prop_type: PropType,
    pub required: bool,
    pub default_expression: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInfo {
    pub fallback_markup: String,
    /// Scoped prop name → bound expression, as written.
    pub scoped_props: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotTable {
    pub default: Option<SlotInfo>,
    pub named: BTreeMap<String, SlotInfo>,
}

impl SlotTable {
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.named.is_empty()
    }

    /// Slot names, `default` first.
    pub fn names(&self) -> Vec<String> {
        self.default
            .as_ref()
            .map(|_| "default".to_string())
            .into_iter()
            .chain(self.named.keys().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    pub props: Vec<PropDescriptor>,
    pub emits: Vec<String>,
    pub slots: SlotTable,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS
// ═══════════════════════════════════════════════════════════════════════════════

fn unquote(text: &str) -> Option<&str> {
    let text = text.trim();
    let first = text.chars().next()?;
    if matches!(first, '"' | '\'' | '`') && text.len() >= 2 && text.ends_with(first) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

fn property_name(key: &str) -> String {
    let key = key.trim();
    unquote(key).unwrap_or(key).to_string()
}

fn parse_prop_type(name: &str, ident: &str) -> PropType {
    PropType::from_ident(ident).unwrap_or_else(|| {
        log::warn!(
            "[aspc] prop \"{}\" has unknown type \"{}\", treating it as Any",
            name,
            ident
        );
        PropType::Any
    })
}

fn parse_prop_entry(entry: &str) -> Option<PropDescriptor> {
    let colon = find_top_level(entry, b':')?;
    let name = property_name(&entry[..colon]);
    if name.is_empty() {
        return None;
    }
    let value = entry[colon + 1..].trim();

    let mut prop = PropDescriptor {
        name,
        prop_type: PropType::Any,
        required: false,
        default_expression: None,
    };

    if !value.starts_with('{') {
        // shorthand `name: Type`
        if is_identifier(value) {
            prop.prop_type = parse_prop_type(&prop.name, value);
        }
        return Some(prop);
    }

    let close = find_matching(value, 0)?;
    for field in split_top_level(&value[1..close], b',') {
        let Some(colon) = find_top_level(field, b':') else {
            continue;
        };
        let field_value = field[colon + 1..].trim();
        match property_name(&field[..colon]).as_str() {
            "type" => prop.prop_type = parse_prop_type(&prop.name, field_value),
            "required" => prop.required = field_value == "true",
            "default" if !field_value.is_empty() => {
                prop.default_expression = Some(field_value.to_string())
            }
            _ => {}
        }
    }
    Some(prop)
}

/// Props declared by `export const props = { ... }`. Missing or unbalanced
/// declarations yield an empty table.
pub fn extract_props(script: &str) -> Vec<PropDescriptor> {
    let Some(m) = PROPS_EXPORT_RE.find(script) else {
        return Vec::new();
    };
    let open = m.end() - 1;
    let Some(close) = find_matching(script, open) else {
        return Vec::new();
    };
    split_top_level(&script[open + 1..close], b',')
        .into_iter()
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(parse_prop_entry)
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event names from `export const emits = [...]`, in order, duplicates kept.
pub fn extract_emits(script: &str) -> Vec<String> {
    let Some(m) = EMITS_EXPORT_RE.find(script) else {
        return Vec::new();
    };
    let open = m.end() - 1;
    let Some(close) = find_matching(script, open) else {
        return Vec::new();
    };
    split_top_level(&script[open + 1..close], b',')
        .into_iter()
        .filter_map(unquote)
        .filter(|name| !name.contains("${"))
        .map(String::from)
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Slot table from the `<slot>` outlets of a tokenized template.
pub fn extract_slots(tokens: &[Token], loc: &Locator) -> Result<SlotTable, CompilerError> {
    let mut table = SlotTable::default();

    for token in tokens {
        let TokenKind::Slot(slot) = &token.kind else {
            continue;
        };
        let name = match slot.attribute("name") {
            Some(attr) => attr.value.clone().unwrap_or_default(),
            None => "default".to_string(),
        };
        if name.trim().is_empty() {
            return Err(loc.error(E_INVALID_SLOT, "slot name must not be empty", token.offset));
        }

        let scoped_props = slot
            .attributes
            .iter()
            .filter_map(|attr| {
                let prop = attr.name.strip_prefix(':')?;
                let value = attr.value.as_deref().unwrap_or("").trim();
                Some((prop.to_string(), value.to_string()))
            })
            .collect();
        let info = SlotInfo {
            fallback_markup: slot.fallback.clone(),
            scoped_props,
        };

        // Outlets with the same name sit in exclusive branches; the first one
        // describes the slot.
        if name == "default" {
            table.default.get_or_insert(info);
        } else {
            table.named.entry(name).or_insert(info);
        }
    }
    Ok(table)
}

pub fn extract_metadata(
    script: &str,
    tokens: &[Token],
    loc: &Locator,
) -> Result<ComponentMetadata, CompilerError> {
    Ok(ComponentMetadata {
        props: extract_props(script),
        emits: extract_emits(script),
        slots: extract_slots(tokens, loc)?,
    })
}
