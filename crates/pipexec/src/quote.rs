// SPDX-License-Identifier: MIT OR Apache-2.0
//! POSIX shell quoting for rendering command lines.

const SPECIAL: &str = "\\'\"`${[|&;<>()*?!";
const SPLIT: &str = " \t\n";

/// Quote one word so a POSIX shell would read it back unchanged.
///
/// Words without whitespace get backslash escapes; anything containing
/// whitespace is wrapped in single quotes as a whole.
pub(crate) fn quote(word: &str) -> String {
    if word.is_empty() {
        return "''".to_string();
    }
    if word.contains(|c: char| SPLIT.contains(c)) {
        return single_quoted(word);
    }

    let mut out = String::with_capacity(word.len() + 2);
    for (i, c) in word.char_indices() {
        if SPECIAL.contains(c) || (c == '~' && i == 0) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn single_quoted(word: &str) -> String {
    let mut out = String::with_capacity(word.len() + 2);
    let mut parts = word.split('\'').peekable();
    while let Some(part) = parts.next() {
        if !part.is_empty() {
            out.push('\'');
            out.push_str(part);
            out.push('\'');
        }
        if parts.peek().is_some() {
            out.push_str("\\'");
        }
    }
    out
}

/// Quote every word and join them with single spaces.
pub(crate) fn join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
