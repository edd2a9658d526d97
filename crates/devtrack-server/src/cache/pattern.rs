//! Redis key patterns.
//!
//! Keys are matched with `glob::Pattern`. Redis spells a few things
//! differently, so patterns are rewritten first:
//! - `\x` escapes become `glob::Pattern::escape` output
//! - `[^...]` negation becomes `[!...]`
//! - `**` collapses to `*` (the glob crate reserves it for paths)
//! - an unterminated `[` is a literal `[`
//! - reversed ranges (`[c-a]`) are flipped

use glob::Pattern;

/// Compile a Redis pattern. `None` if it can never match anything (an
/// empty class such as `[]`).
pub fn compile(pattern: &str) -> Option<Pattern> {
    Pattern::new(&translate(pattern)).ok()
}

/// True if `key` matches the Redis pattern.
pub fn matches(pattern: &str, key: &str) -> bool {
    compile(pattern).is_some_and(|p| p.matches(key))
}

/// Escape Redis metacharacters so `s` only matches itself.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn literal(c: char) -> String {
    Pattern::escape(c.encode_utf8(&mut [0; 4]))
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push('*');
                while chars.get(i + 1) == Some(&'*') {
                    i += 1;
                }
            }
            '?' => out.push('?'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&literal(chars[i]));
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&chars[i + 1..end], &mut out);
                    i = end;
                }
                None => out.push_str(&literal('[')),
            },
            c => out.push_str(&literal(c)),
        }
        i += 1;
    }
    out
}

/// Index of the `]` closing the class opened at `start`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Rewrite a class body as a glob crate class. Members are emitted as
/// ranges (`a-a` for a single char) so `-` and `!` need no placement rules;
/// only `]` must come first.
fn push_class(body: &[char], out: &mut String) {
    let negate = body.first() == Some(&'^');
    let mut i = usize::from(negate);
    let mut close_bracket = false;
    let mut ranges: Vec<(char, char)> = Vec::new();

    let take = |i: usize| -> Option<(char, usize)> {
        match body.get(i)? {
            '\\' if i + 1 < body.len() => Some((body[i + 1], i + 2)),
            c => Some((*c, i + 1)),
        }
    };

    while let Some((lo, next)) = take(i) {
        let range_end = (body.get(next) == Some(&'-')).then(|| take(next + 1)).flatten();
        let (lo, hi, after) = match range_end {
            Some((hi, after)) => (lo.min(hi), lo.max(hi), after),
            None => (lo, lo, next),
        };
        if (lo, hi) == (']', ']') {
            close_bracket = true;
        } else {
            ranges.push((lo, hi));
        }
        i = after;
    }

    // A leading `!` would read as negation
    if !negate && !close_bracket {
        if let Some(pos) = ranges.iter().position(|(lo, _)| *lo != '!') {
            ranges.swap(0, pos);
        } else if ranges.len() == 1 && ranges[0] == ('!', '!') {
            out.push('!');
            return;
        }
    }

    out.push('[');
    if negate {
        out.push('!');
    }
    if close_bracket {
        out.push(']');
    }
    for (lo, hi) in ranges {
        out.push(lo);
        out.push('-');
        out.push(hi);
    }
    out.push(']');
}
