//! Parsing of model output into study notes and flashcards.

use uuid::Uuid;

use crate::models::Flashcard;

/// Notes shorter than this (after marker stripping) are dropped.
const MIN_NOTE_CHARS: usize = 10;

/// Split a notes reply into clean lines, keeping at most `max` of them.
///
/// Leading bullets (`•`, `-`, `*`) and list numbering (`1.`, `2)`) are
/// removed; lines of 10 characters or fewer are dropped.
pub fn parse_notes(reply: &str, max: usize) -> Vec<String> {
    reply
        .lines()
        .map(strip_list_marker)
        .filter(|line| line.chars().count() > MIN_NOTE_CHARS)
        .map(str::to_string)
        .take(max)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let mut rest = line.trim();
    loop {
        let before = rest;
        rest = rest.trim_start_matches(['•', '-', '*']).trim_start();

        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits > 0 {
            let after = &rest[digits..];
            if let Some(stripped) = after.strip_prefix(['.', ')']) {
                rest = stripped.trim_start();
            }
        }

        if rest.len() == before.len() {
            return rest;
        }
    }
}

/// Parse `Q:` / `A:` pairs, keeping at most `max` complete cards.
///
/// Non-empty lines after an `A:` line continue that answer. A question
/// without an answer is discarded.
pub fn parse_flashcards(reply: &str, max: usize) -> Vec<Flashcard> {
    let mut cards = Vec::new();
    let mut question = String::new();
    let mut answer = String::new();

    let mut flush = |question: &mut String, answer: &mut String| {
        if !question.is_empty() && !answer.is_empty() {
            cards.push(Flashcard {
                id: Uuid::new_v4().to_string(),
                question: std::mem::take(question),
                answer: std::mem::take(answer),
            });
        }
        question.clear();
        answer.clear();
    };

    for line in reply.lines().map(str::trim) {
        if let Some(q) = line.strip_prefix("Q:") {
            flush(&mut question, &mut answer);
            question = q.trim().to_string();
        } else if let Some(a) = line.strip_prefix("A:") {
            answer = a.trim().to_string();
        } else if !line.is_empty() && !answer.is_empty() {
            answer.push(' ');
            answer.push_str(line);
        }
    }
    flush(&mut question, &mut answer);

    cards.truncate(max);
    cards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_strip_markers_and_short_lines() {
        let reply = "Here are the notes:\n\
                     1. Paris is the capital of France.\n\
                     2) France has about 68 million people.\n\
                     • The Eiffel Tower opened in 1889.\n\
                     - short\n\
                     \n\
                     * Mitochondria produce cellular energy.";
        let notes = parse_notes(reply, 10);
        assert_eq!(
            notes,
            vec![
                "Here are the notes:",
                "Paris is the capital of France.",
                "France has about 68 million people.",
                "The Eiffel Tower opened in 1889.",
                "Mitochondria produce cellular energy.",
            ]
        );
    }

    #[test]
    fn notes_keep_leading_numbers_that_are_content() {
        let notes = parse_notes("1889 was the year the tower opened.", 10);
        assert_eq!(notes, vec!["1889 was the year the tower opened."]);
    }

    #[test]
    fn notes_are_capped() {
        let reply = (0..20)
            .map(|i| format!("- Note number {i} is long enough"))
            .collect::<Vec<_>>()
            .join("\n");
        let notes = parse_notes(&reply, 10);
        assert_eq!(notes.len(), 10);
        assert_eq!(notes[0], "Note number 0 is long enough");
    }

    #[test]
    fn flashcards_parse_pairs_with_continuations() {
        let reply = "Q: What is the capital of France?\n\
                     A: Paris.\n\
                     It is also the largest city.\n\
                     \n\
                     Q: Question without answer\n\
                     \n\
                     Q: When was the Eiffel Tower completed?\n\
                     A: In 1889.";
        let cards = parse_flashcards(reply, 8);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].question, "What is the capital of France?");
        assert_eq!(cards[0].answer, "Paris. It is also the largest city.");
        assert_eq!(cards[1].answer, "In 1889.");
        assert_ne!(cards[0].id, cards[1].id);
        assert!(Uuid::parse_str(&cards[0].id).is_ok());
    }

    #[test]
    fn flashcards_are_capped() {
        let reply = (0..12)
            .map(|i| format!("Q: q{i}\nA: a{i}\n"))
            .collect::<String>();
        let cards = parse_flashcards(&reply, 8);
        assert_eq!(cards.len(), 8);
        assert_eq!(cards[7].question, "q7");
    }

    #[test]
    fn flashcards_empty_reply() {
        assert!(parse_flashcards("", 8).is_empty());
        assert!(parse_flashcards("no cards here", 8).is_empty());
    }
}
