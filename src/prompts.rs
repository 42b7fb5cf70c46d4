//! System prompts for line-by-line translation.
//!
//! The reply format matters more than the wording: the translator splits the
//! reply on newlines and matches line *n* to input *n*, so the prompt insists
//! on exactly one output line per input line and nothing else.
//!
//! Callers can override the default via
//! [`crate::config::PipelineConfig::system_prompt`].

/// Build the default translation prompt for a fixed language pair.
pub fn translation_prompt(source_language: &str, target_language: &str) -> String {
    format!(
        "You are a helpful translation assistant. \
Translate the given {source_language} text into {target_language}. \
Return only the translated text, without additional commentary.\n\
\n\
The input has one text fragment per line. Reply with exactly one translated \
line per input line, in the same order. Do not merge, split, number, or skip \
lines. If a line cannot be translated (a number, a code, a proper name), \
repeat it unchanged."
    )
}
