//! String-aware bracket scanning shared by the section splitter, the script
//! transform, the metadata extractor and the template tokenizer.
//!
//! All delimiters are ASCII, so byte indices returned here are always valid
//! `str` slice boundaries.

/// If a string literal, template literal or comment starts at `i`, returns the
/// index just past it. Unterminated literals run to the end of input.
pub(crate) fn skip_non_code(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        b'"' | b'\'' => {
            let quote = bytes[i];
            let mut j = i + 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\\' => j += 2,
                    c if c == quote => return Some(j + 1),
                    _ => j += 1,
                }
            }
            Some(bytes.len())
        }
        b'`' => Some(skip_template_literal(bytes, i)),
        b'/' if bytes.get(i + 1) == Some(&b'/') => {
            let mut j = i + 2;
            while j < bytes.len() && bytes[j] != b'\n' {
                j += 1;
            }
            Some(j)
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let mut j = i + 2;
            while j + 1 < bytes.len() {
                if bytes[j] == b'*' && bytes[j + 1] == b'/' {
                    return Some(j + 2);
                }
                j += 1;
            }
            Some(bytes.len())
        }
        _ => None,
    }
}

fn skip_template_literal(bytes: &[u8], start: usize) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'`' => return j + 1,
            b'$' if bytes.get(j + 1) == Some(&b'{') => match match_from(bytes, j + 1) {
                Some(close) => j = close + 1,
                None => return bytes.len(),
            },
            _ => j += 1,
        }
    }
    bytes.len()
}

fn closer_for(open: u8) -> Option<u8> {
    match open {
        b'{' => Some(b'}'),
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        _ => None,
    }
}

fn match_from(bytes: &[u8], open: usize) -> Option<usize> {
    let mut stack: Vec<u8> = vec![closer_for(*bytes.get(open)?)?];
    let mut i = open + 1;
    while i < bytes.len() {
        if let Some(next) = skip_non_code(bytes, i) {
            i = next;
            continue;
        }
        let c = bytes[i];
        if let Some(closer) = closer_for(c) {
            stack.push(closer);
        } else if c == b'}' || c == b')' || c == b']' {
            if stack.pop() != Some(c) {
                return None;
            }
            if stack.is_empty() {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Index of the bracket closing the one at `open` (`{`, `(` or `[`), skipping
/// strings, template literals and comments. `None` when unbalanced.
pub fn find_matching(src: &str, open: usize) -> Option<usize> {
    match_from(src.as_bytes(), open)
}

/// Splits `src` on `sep` where it occurs outside brackets and literals.
pub fn split_top_level(src: &str, sep: u8) -> Vec<&str> {
    let bytes = src.as_bytes();
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_non_code(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&src[start..]);
    parts
}

/// First index of `sep` outside brackets and literals.
pub fn find_top_level(src: &str, sep: u8) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_non_code(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            c if c == sep && depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// End of a single-line statement starting at `start`: the first newline or
/// `;` at bracket depth zero (multi-line brackets are followed), or the point
/// where an enclosing bracket closes.
pub fn statement_end(src: &str, start: usize) -> usize {
    let bytes = src.as_bytes();
    let mut depth: i32 = 0;
    let mut i = start;
    while i < bytes.len() {
        if let Some(next) = skip_non_code(bytes, i) {
            // a line comment ends at the newline, which must still terminate
            i = next;
            continue;
        }
        match bytes[i] {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => {
                depth -= 1;
                if depth < 0 {
                    return i;
                }
            }
            b'\n' | b';' if depth == 0 => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_matching_basic() {
        assert_eq!(find_matching("{hello}", 0), Some(6));
        assert_eq!(find_matching("{a + (b)}", 0), Some(8));
        assert_eq!(find_matching("x(f(1), [2])", 1), Some(11));
    }

    #[test]
    fn test_find_matching_skips_literals() {
        assert_eq!(find_matching("{'string with { brace'}", 0), Some(22));
        assert_eq!(find_matching("{`a ${ {b: 1}.b } }`}", 0), Some(20));
        assert_eq!(find_matching("{ a /* } */ }", 0), Some(12));
    }

    #[test]
    fn test_find_matching_unbalanced() {
        assert_eq!(find_matching("{ a: (1 }", 0), None);
        assert_eq!(find_matching("{ a: 1", 0), None);
    }

    #[test]
    fn test_split_top_level() {
        let parts = split_top_level("a: 1, b: f(1, 2), c: { d: 1, e: 2 }, s: 'x,y'", b',');
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].trim(), "b: f(1, 2)");
        assert_eq!(parts[3].trim(), "s: 'x,y'");
    }

    #[test]
    fn test_statement_end() {
        let src = "$: a = f(1,\n 2)\nnext";
        assert_eq!(&src[..statement_end(src, 0)], "$: a = f(1,\n 2)");
        let src = "x = 1; y = 2";
        assert_eq!(statement_end(src, 0), 5);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("count"));
        assert!(is_identifier("$el"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a.b"));
    }
}
