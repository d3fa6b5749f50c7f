//! Directive transformer.
//!
//! The template is tokenized once (text, tags, slot outlets, interpolations
//! and block markers), block balance is validated against an explicit stack,
//! and the tokens are folded into a tree where `{#if}` chains and loops own
//! their bodies. Lowering to JavaScript happens in `template.rs`, which uses
//! the expression builders at the end of this module.

use lazy_static::lazy_static;
use regex::Regex;

use crate::diagnostic::{
    CompilerError, Locator, E_BRANCH_AFTER_ELSE, E_BRANCH_OUTSIDE_IF, E_MALFORMED_LOOP,
    E_MISMATCHED_CLOSE, E_MISSING_CONDITION, E_UNEXPECTED_CLOSE, E_UNKNOWN_DIRECTIVE,
    E_UNTERMINATED_BLOCK, E_UNTERMINATED_EXPRESSION, E_UNTERMINATED_TAG,
};
use oxc_ast::ast::Expression;

use crate::js::{JsBuilder, TemplatePart};
use crate::scan::find_matching;

lazy_static! {
    static ref TAG_START_RE: Regex = Regex::new(r"^</?[A-Za-z][\w:.-]*").unwrap();
    static ref ATTR_NAME_RE: Regex = Regex::new(r#"^[^\s=/>"'{}]+"#).unwrap();
    static ref SLOT_CLOSE_RE: Regex = Regex::new(r"(?i)</slot\s*>").unwrap();

    static ref FOR_HEADER_RE: Regex = Regex::new(
        r#"^\(?\s*([A-Za-z_$][\w$]*)\s*(?:,\s*([A-Za-z_$][\w$]*)\s*)?\)?\s+in\s+(.+?)(?:\s+:key\s*=\s*(?:"([^"]*)"|'([^']*)'))?\s*$"#
    ).unwrap();
    static ref EACH_HEADER_RE: Regex = Regex::new(
        r#"^(.+?)\s+as\s+\(?\s*([A-Za-z_$][\w$]*)\s*(?:,\s*([A-Za-z_$][\w$]*)\s*)?\)?(?:\s+:key\s*=\s*(?:"([^"]*)"|'([^']*)'))?\s*$"#
    ).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
    /// Value was written as `{expr}` rather than quoted; braces are stripped.
    pub braced: bool,
    /// Offset of the attribute name inside the template.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagToken {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub self_closing: bool,
    pub closing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotToken {
    pub attributes: Vec<Attribute>,
    /// Markup between `<slot>` and `</slot>`, verbatim.
    pub fallback: String,
}

impl SlotToken {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    For,
    Each,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::For => "for",
            BlockKind::Each => "each",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    Tag(TagToken),
    Slot(SlotToken),
    Interp(String),
    If(String),
    ElseIf(String),
    Else,
    For(String),
    Each(String),
    End(BlockKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENIZER
// ═══════════════════════════════════════════════════════════════════════════════

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Splits a leading keyword off a marker body: `if (x)` → (`if`, `(x)`).
fn split_keyword(rest: &str) -> (&str, &str) {
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (&rest[..end], rest[end..].trim())
}

fn lex_brace(inner: &str, offset: usize, loc: &Locator) -> Result<Option<TokenKind>, CompilerError> {
    let trimmed = inner.trim();

    if let Some(rest) = trimmed.strip_prefix('#') {
        let (keyword, argument) = split_keyword(rest);
        return match keyword {
            "if" if argument.is_empty() => Err(loc.error(
                E_MISSING_CONDITION,
                "{#if} requires a condition",
                offset,
            )),
            "if" => Ok(Some(TokenKind::If(argument.to_string()))),
            "for" => Ok(Some(TokenKind::For(argument.to_string()))),
            "each" => Ok(Some(TokenKind::Each(argument.to_string()))),
            _ => Err(loc.error(
                E_UNKNOWN_DIRECTIVE,
                &format!("unknown block {{#{}}}", keyword),
                offset,
            )),
        };
    }

    if let Some(rest) = trimmed.strip_prefix(':') {
        let (keyword, argument) = split_keyword(rest);
        if keyword == "else" {
            if argument.is_empty() {
                return Ok(Some(TokenKind::Else));
            }
            let (next, condition) = split_keyword(argument);
            if next == "if" {
                if condition.is_empty() {
                    return Err(loc.error(
                        E_MISSING_CONDITION,
                        "{:else if} requires a condition",
                        offset,
                    ));
                }
                return Ok(Some(TokenKind::ElseIf(condition.to_string())));
            }
        }
        return Err(loc.error(
            E_UNKNOWN_DIRECTIVE,
            &format!("unknown branch {{:{}}}", rest.trim()),
            offset,
        ));
    }

    if let Some(rest) = trimmed.strip_prefix('/') {
        let kind = match rest.trim() {
            "if" => BlockKind::If,
            "for" => BlockKind::For,
            "each" => BlockKind::Each,
            other => {
                return Err(loc.error(
                    E_UNKNOWN_DIRECTIVE,
                    &format!("unknown closing marker {{/{}}}", other),
                    offset,
                ))
            }
        };
        return Ok(Some(TokenKind::End(kind)));
    }

    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(TokenKind::Interp(trimmed.to_string())))
}

fn lex_attribute_value(
    template: &str,
    i: usize,
    tag_start: usize,
    loc: &Locator,
) -> Result<(String, bool, usize), CompilerError> {
    let bytes = template.as_bytes();
    match bytes.get(i) {
        Some(&quote @ (b'"' | b'\'')) => {
            let close = template[i + 1..]
                .find(quote as char)
                .map(|c| i + 1 + c)
                .ok_or_else(|| loc.error(E_UNTERMINATED_TAG, "unterminated attribute value", tag_start))?;
            Ok((template[i + 1..close].to_string(), false, close + 1))
        }
        Some(b'{') => {
            let close = find_matching(template, i).ok_or_else(|| {
                loc.error(E_UNTERMINATED_EXPRESSION, "unterminated expression in attribute", i)
            })?;
            Ok((template[i + 1..close].trim().to_string(), true, close + 1))
        }
        _ => {
            let mut end = i;
            while end < bytes.len() && !bytes[end].is_ascii_whitespace() && bytes[end] != b'>' {
                end += 1;
            }
            Ok((template[i..end].to_string(), false, end))
        }
    }
}

/// Lexes the tag starting at `start`. Returns the token and the index just
/// past it (past `</slot>` for slot outlets).
fn lex_tag(template: &str, start: usize, loc: &Locator) -> Result<(TokenKind, usize), CompilerError> {
    let bytes = template.as_bytes();
    let head = TAG_START_RE
        .find(&template[start..])
        .ok_or_else(|| loc.error(E_UNTERMINATED_TAG, "malformed tag", start))?;
    let closing = bytes.get(start + 1) == Some(&b'/');
    let name_start = start + if closing { 2 } else { 1 };
    let name = template[name_start..start + head.end()].to_string();
    let mut i = start + head.end();

    let unterminated = || loc.error(E_UNTERMINATED_TAG, &format!("unterminated <{}> tag", name), start);

    if closing {
        let close = template[i..].find('>').ok_or_else(unterminated)?;
        let tag = TagToken {
            name,
            attributes: Vec::new(),
            self_closing: false,
            closing: true,
        };
        return Ok((TokenKind::Tag(tag), i + close + 1));
    }

    let mut attributes = Vec::new();
    let self_closing;
    loop {
        i = skip_whitespace(bytes, i);
        if i >= bytes.len() {
            return Err(unterminated());
        }
        if bytes[i] == b'>' {
            self_closing = false;
            i += 1;
            break;
        }
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>') {
            self_closing = true;
            i += 2;
            break;
        }
        let Some(m) = ATTR_NAME_RE.find(&template[i..]) else {
            i += 1;
            continue;
        };
        let attr_offset = i;
        let attr_name = m.as_str().to_string();
        i += m.end();
        let after_name = skip_whitespace(bytes, i);
        let (value, braced) = if bytes.get(after_name) == Some(&b'=') {
            let value_start = skip_whitespace(bytes, after_name + 1);
            let (value, braced, end) = lex_attribute_value(template, value_start, start, loc)?;
            i = end;
            (Some(value), braced)
        } else {
            (None, false)
        };
        attributes.push(Attribute {
            name: attr_name,
            value,
            braced,
            offset: attr_offset,
        });
    }

    if name.eq_ignore_ascii_case("slot") {
        let fallback = if self_closing {
            String::new()
        } else {
            let close = SLOT_CLOSE_RE.find_at(template, i).ok_or_else(|| {
                loc.error(E_UNTERMINATED_TAG, "unterminated <slot> element", start)
            })?;
            let fallback = template[i..close.start()].to_string();
            i = close.end();
            fallback
        };
        return Ok((TokenKind::Slot(SlotToken { attributes, fallback }), i));
    }

    Ok((
        TokenKind::Tag(TagToken {
            name,
            attributes,
            self_closing,
            closing: false,
        }),
        i,
    ))
}

fn push_text(tokens: &mut Vec<Token>, template: &str, start: usize, end: usize) {
    if start < end {
        tokens.push(Token {
            kind: TokenKind::Text(template[start..end].to_string()),
            offset: start,
        });
    }
}

/// Tokenize template markup. Offsets are relative to `template`.
pub fn tokenize(template: &str, loc: &Locator) -> Result<Vec<Token>, CompilerError> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' if template[i..].starts_with("<!--") => {
                // comments are opaque text
                i = template[i + 4..]
                    .find("-->")
                    .map(|e| i + 4 + e + 3)
                    .unwrap_or(bytes.len());
            }
            b'<' if TAG_START_RE.is_match(&template[i..]) => {
                push_text(&mut tokens, template, text_start, i);
                let (kind, end) = lex_tag(template, i, loc)?;
                tokens.push(Token { kind, offset: i });
                i = end;
                text_start = i;
            }
            b'{' if bytes.get(i + 1) == Some(&b'}') => i += 2,
            b'{' => {
                let close = find_matching(template, i)
                    .ok_or_else(|| loc.error(E_UNTERMINATED_EXPRESSION, "unterminated expression", i))?;
                if let Some(kind) = lex_brace(&template[i + 1..close], i, loc)? {
                    push_text(&mut tokens, template, text_start, i);
                    tokens.push(Token { kind, offset: i });
                    text_start = close + 1;
                }
                i = close + 1;
            }
            _ => i += 1,
        }
    }
    push_text(&mut tokens, template, text_start, bytes.len());
    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK BALANCE
// ═══════════════════════════════════════════════════════════════════════════════

fn opened_at(loc: &Locator, offset: usize) -> String {
    let (line, column) = loc.position(offset);
    format!("block opened at line {}, column {}", line, column)
}

/// Fails fast on the first structural error in the block markers.
pub fn validate_blocks(tokens: &[Token], loc: &Locator) -> Result<(), CompilerError> {
    // (kind, offset, else seen)
    let mut stack: Vec<(BlockKind, usize, bool)> = Vec::new();

    for token in tokens {
        match &token.kind {
            TokenKind::If(_) => stack.push((BlockKind::If, token.offset, false)),
            TokenKind::For(_) => stack.push((BlockKind::For, token.offset, false)),
            TokenKind::Each(_) => stack.push((BlockKind::Each, token.offset, false)),
            TokenKind::ElseIf(_) | TokenKind::Else => {
                let marker = if matches!(token.kind, TokenKind::Else) {
                    "{:else}"
                } else {
                    "{:else if}"
                };
                match stack.last_mut() {
                    Some((BlockKind::If, opened, else_seen)) => {
                        if *else_seen {
                            return Err(loc
                                .error(
                                    E_BRANCH_AFTER_ELSE,
                                    &format!("{} after {{:else}}", marker),
                                    token.offset,
                                )
                                .with_note(opened_at(loc, *opened)));
                        }
                        if matches!(token.kind, TokenKind::Else) {
                            *else_seen = true;
                        }
                    }
                    _ => {
                        return Err(loc.error(
                            E_BRANCH_OUTSIDE_IF,
                            &format!("{} outside of an {{#if}} block", marker),
                            token.offset,
                        ))
                    }
                }
            }
            TokenKind::End(kind) => match stack.pop() {
                None => {
                    return Err(loc.error(
                        E_UNEXPECTED_CLOSE,
                        &format!("unexpected {{/{}}}", kind.as_str()),
                        token.offset,
                    ))
                }
                Some((open, opened, _)) if open != *kind => {
                    return Err(loc
                        .error(
                            E_MISMATCHED_CLOSE,
                            &format!(
                                "{{/{}}} does not match the open {{#{}}} block",
                                kind.as_str(),
                                open.as_str()
                            ),
                            token.offset,
                        )
                        .with_note(opened_at(loc, opened)));
                }
                Some(_) => {}
            },
            _ => {}
        }
    }

    match stack.last() {
        Some((kind, opened, _)) => Err(loc
            .error(
                E_UNTERMINATED_BLOCK,
                &format!("unterminated {{#{}}} block", kind.as_str()),
                *opened,
            )
            .with_suggestion(format!("close the block with {{/{}}}", kind.as_str()))),
        None => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct LoopHeader {
    pub item: String,
    pub index: Option<String>,
    pub source: String,
    pub key: Option<String>,
}

impl LoopHeader {
    /// Names bound inside the loop body.
    pub fn bindings(&self) -> Vec<&str> {
        let mut names = vec![self.item.as_str()];
        if let Some(index) = &self.index {
            names.push(index.as_str());
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: String,
    pub body: Vec<Node>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Tag { tag: TagToken, offset: usize },
    Slot { slot: SlotToken, offset: usize },
    Interp { expression: String, offset: usize },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Loop {
        header: LoopHeader,
        body: Vec<Node>,
        offset: usize,
    },
}

fn key_capture(caps: &regex::Captures, quoted: usize) -> Option<String> {
    caps.get(quoted)
        .or_else(|| caps.get(quoted + 1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|k| !k.is_empty())
}

/// Parse `ITEM[, INDEX] in SOURCE [:key="EXPR"]` or
/// `SOURCE as ITEM[, INDEX] [:key="EXPR"]`.
pub fn parse_loop_header(
    header: &str,
    kind: BlockKind,
    offset: usize,
    loc: &Locator,
) -> Result<LoopHeader, CompilerError> {
    let header = header.trim();
    let parsed = match kind {
        BlockKind::Each => EACH_HEADER_RE.captures(header).map(|caps| LoopHeader {
            item: caps[2].to_string(),
            index: caps.get(3).map(|m| m.as_str().to_string()),
            source: caps[1].trim().to_string(),
            key: key_capture(&caps, 4),
        }),
        _ => FOR_HEADER_RE.captures(header).map(|caps| LoopHeader {
            item: caps[1].to_string(),
            index: caps.get(2).map(|m| m.as_str().to_string()),
            source: caps[3].trim().to_string(),
            key: key_capture(&caps, 4),
        }),
    };
    parsed.ok_or_else(|| {
        loc.error(
            E_MALFORMED_LOOP,
            &format!("malformed {{#{}}} header \"{}\"", kind.as_str(), header),
            offset,
        )
    })
}

/// Progress through one `{#if}` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfState {
    AwaitingIf,
    InIfBody,
    InElseIfBody(usize),
    InElseBody,
    Closed,
}

struct IfFrame {
    state: IfState,
    opened: usize,
    branches: Vec<Branch>,
    otherwise: Option<Vec<Node>>,
    pending: Option<(String, usize)>,
    body: Vec<Node>,
}

impl IfFrame {
    fn new(opened: usize) -> Self {
        IfFrame {
            state: IfState::AwaitingIf,
            opened,
            branches: Vec::new(),
            otherwise: None,
            pending: None,
            body: Vec::new(),
        }
    }

    fn flush_branch(&mut self) {
        let body = std::mem::take(&mut self.body);
        match self.state {
            IfState::InIfBody | IfState::InElseIfBody(_) => {
                if let Some((condition, offset)) = self.pending.take() {
                    self.branches.push(Branch {
                        condition,
                        body,
                        offset,
                    });
                }
            }
            IfState::InElseBody => self.otherwise = Some(body),
            IfState::AwaitingIf | IfState::Closed => {}
        }
    }

    fn open(&mut self, condition: String, offset: usize) {
        self.pending = Some((condition, offset));
        self.state = IfState::InIfBody;
    }

    fn else_if(&mut self, condition: String, offset: usize, loc: &Locator) -> Result<(), CompilerError> {
        let n = match self.state {
            IfState::InIfBody => 1,
            IfState::InElseIfBody(n) => n + 1,
            _ => {
                return Err(loc
                    .error(E_BRANCH_AFTER_ELSE, "{:else if} after {:else}", offset)
                    .with_note(opened_at(loc, self.opened)))
            }
        };
        self.flush_branch();
        self.pending = Some((condition, offset));
        self.state = IfState::InElseIfBody(n);
        Ok(())
    }

    fn otherwise(&mut self, offset: usize, loc: &Locator) -> Result<(), CompilerError> {
        if !matches!(self.state, IfState::InIfBody | IfState::InElseIfBody(_)) {
            return Err(loc
                .error(E_BRANCH_AFTER_ELSE, "{:else} after {:else}", offset)
                .with_note(opened_at(loc, self.opened)));
        }
        self.flush_branch();
        self.state = IfState::InElseBody;
        Ok(())
    }

    fn close(mut self) -> Node {
        self.flush_branch();
        self.state = IfState::Closed;
        Node::If {
            branches: self.branches,
            otherwise: self.otherwise,
        }
    }
}

enum Frame {
    If(IfFrame),
    Loop {
        kind: BlockKind,
        header: LoopHeader,
        body: Vec<Node>,
        opened: usize,
    },
}

impl Frame {
    fn kind(&self) -> BlockKind {
        match self {
            Frame::If(_) => BlockKind::If,
            Frame::Loop { kind, .. } => *kind,
        }
    }

    fn opened(&self) -> usize {
        match self {
            Frame::If(f) => f.opened,
            Frame::Loop { opened, .. } => *opened,
        }
    }

    fn body_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Frame::If(f) => &mut f.body,
            Frame::Loop { body, .. } => body,
        }
    }

    fn finish(self) -> Node {
        match self {
            Frame::If(f) => f.close(),
            Frame::Loop {
                header,
                body,
                opened,
                ..
            } => Node::Loop {
                header,
                body,
                offset: opened,
            },
        }
    }
}

fn current<'s>(stack: &'s mut [Frame], root: &'s mut Vec<Node>) -> &'s mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => frame.body_mut(),
        None => root,
    }
}

/// Fold a validated token stream into a node tree.
pub fn build_tree(tokens: Vec<Token>, loc: &Locator) -> Result<Vec<Node>, CompilerError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        let offset = token.offset;
        match token.kind {
            TokenKind::Text(text) => current(&mut stack, &mut root).push(Node::Text(text)),
            TokenKind::Tag(tag) => current(&mut stack, &mut root).push(Node::Tag { tag, offset }),
            TokenKind::Slot(slot) => current(&mut stack, &mut root).push(Node::Slot { slot, offset }),
            TokenKind::Interp(expression) => {
                current(&mut stack, &mut root).push(Node::Interp { expression, offset })
            }
            TokenKind::If(condition) => {
                let mut frame = IfFrame::new(offset);
                frame.open(condition, offset);
                stack.push(Frame::If(frame));
            }
            TokenKind::ElseIf(condition) => match stack.last_mut() {
                Some(Frame::If(frame)) => frame.else_if(condition, offset, loc)?,
                _ => {
                    return Err(loc.error(
                        E_BRANCH_OUTSIDE_IF,
                        "{:else if} outside of an {#if} block",
                        offset,
                    ))
                }
            },
            TokenKind::Else => match stack.last_mut() {
                Some(Frame::If(frame)) => frame.otherwise(offset, loc)?,
                _ => {
                    return Err(loc.error(
                        E_BRANCH_OUTSIDE_IF,
                        "{:else} outside of an {#if} block",
                        offset,
                    ))
                }
            },
            TokenKind::For(header) => {
                let header = parse_loop_header(&header, BlockKind::For, offset, loc)?;
                stack.push(Frame::Loop {
                    kind: BlockKind::For,
                    header,
                    body: Vec::new(),
                    opened: offset,
                });
            }
            TokenKind::Each(header) => {
                let header = parse_loop_header(&header, BlockKind::Each, offset, loc)?;
                stack.push(Frame::Loop {
                    kind: BlockKind::Each,
                    header,
                    body: Vec::new(),
                    opened: offset,
                });
            }
            TokenKind::End(kind) => {
                let frame = stack.pop().ok_or_else(|| {
                    loc.error(
                        E_UNEXPECTED_CLOSE,
                        &format!("unexpected {{/{}}}", kind.as_str()),
                        offset,
                    )
                })?;
                if frame.kind() != kind {
                    return Err(loc
                        .error(
                            E_MISMATCHED_CLOSE,
                            &format!(
                                "{{/{}}} does not match the open {{#{}}} block",
                                kind.as_str(),
                                frame.kind().as_str()
                            ),
                            offset,
                        )
                        .with_note(opened_at(loc, frame.opened())));
                }
                let node = frame.finish();
                current(&mut stack, &mut root).push(node);
            }
        }
    }

    if let Some(frame) = stack.last() {
        return Err(loc.error(
            E_UNTERMINATED_BLOCK,
            &format!("unterminated {{#{}}} block", frame.kind().as_str()),
            frame.opened(),
        ));
    }
    Ok(root)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

/// `c1 ? b1 : c2 ? b2 : otherwise`, with `""` when there is no else branch.
pub fn conditional_chain<'a>(
    js: JsBuilder<'a>,
    branches: Vec<(Expression<'a>, Expression<'a>)>,
    otherwise: Option<Expression<'a>>,
) -> Expression<'a> {
    branches
        .into_iter()
        .rev()
        .fold(otherwise.unwrap_or_else(|| js.string("")), |alternate, (test, body)| {
            js.conditional(test, body, alternate)
        })
}

/// `SOURCE.map((ITEM, INDEX) => `[<!--key:${KEY}-->]BODY`).join("")`.
///
/// `source` and `key` arrive already rewritten: the collection against the
/// enclosing names, the key with the loop bindings shadowing them.
pub fn loop_expression<'a>(
    js: JsBuilder<'a>,
    header: &LoopHeader,
    source: Expression<'a>,
    key: Option<Expression<'a>>,
    body: Vec<TemplatePart<'a>>,
) -> Expression<'a> {
    let mut parts = Vec::with_capacity(body.len() + 3);
    if let Some(key) = key {
        parts.push(TemplatePart::Text("<!--key:".to_string()));
        parts.push(TemplatePart::Expr(key));
        parts.push(TemplatePart::Text("-->".to_string()));
    }
    parts.extend(body);

    let mapper = js.arrow(&header.bindings(), js.template(parts));
    let mapped = js.method(source, "map", [mapper]);
    js.method(mapped, "join", [js.string("")])
}
