//! Reply cleanup: normalise an upstream translation reply and align it with
//! the request.
//!
//! A batch is sent as newline-joined text and the reply is split back on
//! newlines, so anything that adds or removes a line shifts every later
//! translation onto the wrong region. Models occasionally wrap the reply in
//! code fences, use `\r\n`, or add trailing blank lines; those are removed
//! here before [`align_lines`] forces the line count to match the request.
//!
//! Rules run in this order: strip outer fences, normalise line endings,
//! strip invisible characters, trim trailing whitespace per line, then drop
//! leading and trailing blank lines.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to a raw reply.
pub fn clean_reply(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    trim_blank_edges(&s)
}

/// Collapse a source text onto one line so that one input is exactly one
/// line of the request.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a cleaned reply into exactly `sources.len()` lines.
///
/// Surplus lines are dropped. Missing lines are filled with the matching
/// source text so a region is never left blank.
pub fn align_lines(reply: &str, sources: &[String]) -> Vec<String> {
    let mut lines: Vec<String> = if reply.is_empty() {
        Vec::new()
    } else {
        reply.split('\n').map(|l| l.to_string()).collect()
    };
    lines.truncate(sources.len());
    let have = lines.len();
    lines.extend(sources[have..].iter().cloned());
    lines
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").expect("static regex is valid")
});

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Drop blank lines at either end ───────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_outer_fences("```\nhola\nmundo\n```"), "hola\nmundo");
        assert_eq!(strip_outer_fences("```text\nhola\n```"), "hola");
        assert_eq!(strip_outer_fences("hola"), "hola");
    }

    #[test]
    fn clean_reply_full() {
        let raw = "\n```\r\nhola  \r\nmun\u{200B}do\r\n```\n\n";
        assert_eq!(clean_reply(raw), "hola\nmundo");
    }

    #[test]
    fn single_line_flattens_newlines() {
        assert_eq!(single_line("two\nlines  here\t"), "two lines here");
    }

    #[test]
    fn align_truncates_extra_lines() {
        let sources = strings(&["a", "b"]);
        assert_eq!(align_lines("x\ny\nz", &sources), strings(&["x", "y"]));
    }

    #[test]
    fn align_pads_with_source_text() {
        let sources = strings(&["one", "two", "three"]);
        assert_eq!(
            align_lines("uno", &sources),
            strings(&["uno", "two", "three"])
        );
    }

    #[test]
    fn align_empty_reply() {
        let sources = strings(&["one"]);
        assert_eq!(align_lines("", &sources), strings(&["one"]));
        assert!(align_lines("anything", &[]).is_empty());
    }
}
