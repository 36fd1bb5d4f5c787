//! Assembles the text handed to the generation backend.

use crate::memory::types::MemoryEntry;

const PREAMBLE: &str = "You are a coding assistant. Consider the following prior examples as context.\n\
Use them only when relevant and avoid repeating mistakes.\n\n";

const INSTRUCTION_HEADER: &str = "\n\nCurrent instruction:\n";

/// Build the prompt for `user_text` given retrieved `context`.
///
/// With no context the user text is returned unchanged. Otherwise the
/// preamble is followed by each entry as a `User:`/`Assistant:` pair (trimmed,
/// in the order given, separated by blank lines) and then the current
/// instruction.
pub fn build_prompt(user_text: &str, context: &[MemoryEntry]) -> String {
    if context.is_empty() {
        return user_text.to_string();
    }

    let examples = context
        .iter()
        .map(|entry| {
            format!(
                "User:\n{}\n\nAssistant:\n{}",
                entry.prompt.trim(),
                entry.response.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut out =
        String::with_capacity(PREAMBLE.len() + examples.len() + INSTRUCTION_HEADER.len() + user_text.len());
    out.push_str(PREAMBLE);
    out.push_str(&examples);
    out.push_str(INSTRUCTION_HEADER);
    out.push_str(user_text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(prompt: &str, response: &str) -> MemoryEntry {
        MemoryEntry {
            id: format!("id-{prompt}"),
            timestamp: Utc::now(),
            prompt: prompt.into(),
            response: response.into(),
            tags: Default::default(),
            token_count: 0,
            embedding: vec![],
        }
    }

    #[test]
    fn empty_context_is_verbatim() {
        assert_eq!(build_prompt("  hi there ", &[]), "  hi there ");
    }

    #[test]
    fn single_entry_layout() {
        let prompt = build_prompt("add a test", &[entry("fix bug", "patched null check")]);
        assert_eq!(
            prompt,
            "You are a coding assistant. Consider the following prior examples as context.\n\
             Use them only when relevant and avoid repeating mistakes.\n\n\
             User:\nfix bug\n\nAssistant:\npatched null check\n\n\
             Current instruction:\nadd a test"
        );
    }

    #[test]
    fn entries_are_trimmed_and_kept_in_order() {
        let prompt = build_prompt(
            "next",
            &[entry("  first\n", "\tone  "), entry("second", "two\n\n")],
        );
        let first = prompt.find("User:\nfirst\n\nAssistant:\none").unwrap();
        let second = prompt.find("User:\nsecond\n\nAssistant:\ntwo").unwrap();
        assert!(first < second);
        assert!(prompt.contains("one\n\nUser:\nsecond"));
        assert!(prompt.ends_with("two\n\nCurrent instruction:\nnext"));
    }

    #[test]
    fn user_text_is_not_trimmed() {
        let prompt = build_prompt(" spaced ", &[entry("a", "b")]);
        assert!(prompt.ends_with("Current instruction:\n spaced "));
    }
}
