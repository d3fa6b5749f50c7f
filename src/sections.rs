//! Section splitting for `.aspc` sources.
//!
//! Two layouts are accepted: a `---` fenced script followed by markup, or
//! explicit `<script>`, `<template>` and `<style>` blocks in any order.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::diagnostic::{
    CompilerError, E_DUPLICATE_SECTION, E_UNCLOSED_FRONTMATTER, E_UNCLOSED_SECTION,
};

lazy_static! {
    static ref BLOCK_OPEN_RE: Regex =
        Regex::new(r"(?i)<(script|template|style)\b([^>]*)>").unwrap();
    static ref TEMPLATE_TAG_RE: Regex = Regex::new(r"(?i)<(/?)template\b[^>]*>").unwrap();
    static ref SCRIPT_CLOSE_RE: Regex = Regex::new(r"(?i)</script\s*>").unwrap();
    static ref STYLE_CLOSE_RE: Regex = Regex::new(r"(?i)</style\s*>").unwrap();

    /// Attribute regex for parsing section attributes
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"(?i)([a-z0-9-]+)(?:=(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub content: String,
    /// Byte offset of `content` inside the original source.
    pub offset: usize,
    pub attributes: BTreeMap<String, String>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    pub fn lang(&self) -> Option<&str> {
        self.attributes.get("lang").map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sections {
    pub script: Section,
    pub template: Section,
    pub style: Section,
}

struct Block {
    name: String,
    attributes: BTreeMap<String, String>,
    start: usize,
    content_start: usize,
    content_end: usize,
    end: usize,
}

fn parse_attributes(attr_string: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    for caps in ATTR_REGEX.captures_iter(attr_string) {
        if let Some(name) = caps.get(1) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "true".to_string());
            attributes.insert(name.as_str().to_lowercase(), value);
        }
    }
    attributes
}

/// Section with surrounding whitespace trimmed and the offset adjusted.
fn trimmed(source: &str, start: usize, end: usize) -> (String, usize) {
    let raw = &source[start..end];
    let lead = raw.len() - raw.trim_start().len();
    (raw.trim().to_string(), start + lead)
}

/// Finds the end of the `<template>` opened at `content_start`, honouring
/// nested `<template>` elements. Returns (close_start, close_end).
fn find_template_close(source: &str, content_start: usize) -> Option<(usize, usize)> {
    let mut depth = 1;
    for m in TEMPLATE_TAG_RE.find_iter(&source[content_start..]) {
        let is_close = m.as_str().starts_with("</");
        if is_close {
            depth -= 1;
            if depth == 0 {
                return Some((content_start + m.start(), content_start + m.end()));
            }
        } else if !m.as_str().ends_with("/>") {
            depth += 1;
        }
    }
    None
}

fn find_blocks(source: &str, from: usize, file: &str) -> Result<Vec<Block>, CompilerError> {
    let mut blocks = Vec::new();
    let mut pos = from;
    while let Some(caps) = BLOCK_OPEN_RE.captures_at(source, pos) {
        let whole = caps.get(0).unwrap();
        let name = caps[1].to_lowercase();
        let attributes = parse_attributes(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
        let content_start = whole.end();

        let close = if name == "template" {
            find_template_close(source, content_start)
        } else {
            let close_re: &Regex = if name == "script" {
                &SCRIPT_CLOSE_RE
            } else {
                &STYLE_CLOSE_RE
            };
            close_re
                .find_at(source, content_start)
                .map(|m| (m.start(), m.end()))
        };

        let Some((content_end, end)) = close else {
            return Err(CompilerError::at(
                E_UNCLOSED_SECTION,
                &format!("<{}> section is never closed", name),
                file,
                source,
                whole.start(),
            ));
        };

        blocks.push(Block {
            name,
            attributes,
            start: whole.start(),
            content_start,
            content_end,
            end,
        });
        pos = end;
    }
    Ok(blocks)
}

/// Returns the frontmatter script as (content_start, content_end, rest_start).
fn split_frontmatter(source: &str, file: &str) -> Result<Option<(usize, usize, usize)>, CompilerError> {
    let lead = source.len() - source.trim_start().len();
    let first_line_end = source[lead..]
        .find('\n')
        .map(|i| lead + i)
        .unwrap_or(source.len());
    if source[lead..first_line_end].trim() != "---" {
        return Ok(None);
    }

    let content_start = (first_line_end + 1).min(source.len());
    let mut line_start = content_start;
    while line_start < source.len() {
        let line_end = source[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(source.len());
        if source[line_start..line_end].trim() == "---" {
            let rest_start = (line_end + 1).min(source.len());
            return Ok(Some((content_start, line_start, rest_start)));
        }
        line_start = line_end + 1;
    }

    Err(CompilerError::at(
        E_UNCLOSED_FRONTMATTER,
        "script fence opened with --- is never closed",
        file,
        source,
        lead,
    ))
}

fn duplicate(name: &str, block: &Block, source: &str, file: &str) -> CompilerError {
    CompilerError::at(
        E_DUPLICATE_SECTION,
        &format!("duplicate <{}> section", name),
        file,
        source,
        block.start,
    )
}

/// Split a component source into its script, template and style sections.
pub fn split_sections(source: &str, file: &str) -> Result<Sections, CompilerError> {
    let mut sections = Sections::default();
    let mut rest_start = 0;
    let mut has_script = false;

    if let Some((start, end, rest)) = split_frontmatter(source, file)? {
        let (content, offset) = trimmed(source, start, end);
        sections.script = Section {
            content,
            offset,
            attributes: BTreeMap::new(),
        };
        has_script = true;
        rest_start = rest;
    }

    let blocks = find_blocks(source, rest_start, file)?;
    let mut template_block: Option<&Block> = None;
    let mut has_style = false;

    for block in &blocks {
        match block.name.as_str() {
            "script" => {
                if has_script {
                    return Err(duplicate("script", block, source, file));
                }
                let (content, offset) = trimmed(source, block.content_start, block.content_end);
                sections.script = Section {
                    content,
                    offset,
                    attributes: block.attributes.clone(),
                };
                has_script = true;
            }
            "style" => {
                if has_style {
                    return Err(duplicate("style", block, source, file));
                }
                let (content, offset) = trimmed(source, block.content_start, block.content_end);
                sections.style = Section {
                    content,
                    offset,
                    attributes: block.attributes.clone(),
                };
                has_style = true;
            }
            _ => {
                if template_block.is_some() {
                    return Err(duplicate("template", block, source, file));
                }
                template_block = Some(block);
            }
        }
    }

    if let Some(block) = template_block {
        let (content, offset) = trimmed(source, block.content_start, block.content_end);
        sections.template = Section {
            content,
            offset,
            attributes: block.attributes.clone(),
        };
    } else {
        // Loose markup: blank out script/style blocks so offsets stay exact.
        let mut loose: Vec<u8> = source.as_bytes()[..].to_vec();
        for b in loose.iter_mut().take(rest_start) {
            if *b != b'\n' {
                *b = b' ';
            }
        }
        for block in &blocks {
            for b in &mut loose[block.start..block.end] {
                if *b != b'\n' {
                    *b = b' ';
                }
            }
        }
        let loose = String::from_utf8_lossy(&loose).into_owned();
        let (content, offset) = trimmed(&loose, rest_start, loose.len());
        sections.template = Section {
            content,
            offset,
            attributes: BTreeMap::new(),
        };
    }

    log::debug!(
        "[aspc] sections for {}: script={}B template={}B style={}B",
        file,
        sections.script.content.len(),
        sections.template.content.len(),
        sections.style.content.len()
    );

    Ok(sections)
}
