//! Parenthesis- and quote-aware scanning over path expressions.
//!
//! All offsets are byte offsets. Single-quoted string literals are skipped,
//! so `where(url='http://x/(y)')` is treated as one balanced group.

/// A `.where(...)` clause located inside an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhereClause<'a> {
    /// Offset of the `.` that starts `.where(`.
    pub start: usize,
    /// Offset of the matching `)` (inclusive).
    pub end: usize,
    /// Text between the parentheses.
    pub body: &'a str,
}

impl WhereClause<'_> {
    /// Offset of the opening parenthesis.
    pub fn open(&self) -> usize {
        self.start + ".where".len()
    }
}

/// Returns the offset of the `)` matching the `(` at `open`.
pub fn matching_close(s: &str, open: usize) -> Option<usize> {
    if s.as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in s[open..].char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Returns the offset of the `(` matching the `)` at `close`.
pub fn matching_open(s: &str, close: usize) -> Option<usize> {
    if s.as_bytes().get(close) != Some(&b')') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in s[..=close].char_indices().rev() {
        match c {
            '\'' => in_quote = !in_quote,
            ')' if !in_quote => depth += 1,
            '(' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Returns the span `(open, close)` of the first balanced parenthesis group.
///
/// ```rust
/// use criteria_chain::fhirpath::find_balanced_parentheses;
///
/// let s = "a.where(b.exists(c = 1)).d";
/// let (open, close) = find_balanced_parentheses(s).unwrap();
/// assert_eq!(&s[open..=close], "(b.exists(c = 1))");
/// ```
pub fn find_balanced_parentheses(s: &str) -> Option<(usize, usize)> {
    let open = first_outside_quotes(s, '(')?;
    matching_close(s, open).map(|close| (open, close))
}

/// Locates the first `.where(...)` clause starting at or after `from`.
pub fn extract_where_clause(s: &str, from: usize) -> Option<WhereClause<'_>> {
    let from = from.min(s.len());
    let start = from + s.get(from..)?.find(".where(")?;
    let open = start + ".where".len();
    let end = matching_close(s, open)?;
    Some(WhereClause {
        start,
        end,
        body: &s[open + 1..end],
    })
}

/// Splits `s` on `sep` at parenthesis depth zero and outside quotes.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut last = 0;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            c if c == sep && depth == 0 && !in_quote => {
                parts.push(&s[last..i]);
                last = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[last..]);
    parts
}

/// Returns the offset of the last `.` at parenthesis depth zero.
pub fn last_top_level_dot(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut found = None;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            '.' if depth == 0 && !in_quote => found = Some(i),
            _ => {}
        }
    }
    found
}

/// Returns true if every parenthesis in `s` is balanced.
pub fn is_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for c in s.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn first_outside_quotes(s: &str, needle: char) -> Option<usize> {
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        if c == '\'' {
            in_quote = !in_quote;
        } else if c == needle && !in_quote {
            return Some(i);
        }
    }
    None
}
