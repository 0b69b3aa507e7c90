//! Prompt templates for the quiz creation agents.

use super::types::{Blueprint, Question, ANSWER_UNAVAILABLE};

/// Characters of document text sent to the summarize agent.
pub const MAX_DOCUMENT_CHARS: usize = 8000;

pub fn summarize(text: &str) -> String {
    let content: String = text.chars().take(MAX_DOCUMENT_CHARS).collect();

    format!(
        r#"You are an academic content analyzer.

Analyze ONLY the content below and produce a structured summary to support exam question generation.

Rules:
1. Use only information present in the content.
2. Do not add external facts, assumptions or examples.
3. Do not infer missing information.

Produce:
- "summary": 5 to 10 sentences capturing the core concepts.
- "key_topics": the major themes explicitly mentioned, as a list of short strings.
- "difficulty_level": exactly one of "easy" (basic definitions), "medium" (conceptual understanding) or "hard" (technical depth, formulas, advanced theory).

CONTENT:
{content}

Respond with JSON: {{"summary": "...", "key_topics": ["..."], "difficulty_level": "easy|medium|hard"}}"#
    )
}

pub fn enhance(summary: &str, blueprint: &Blueprint, professor_note: Option<&str>) -> String {
    let blueprint = serde_json::to_string_pretty(blueprint).unwrap_or_else(|_| "{}".to_string());
    let note = professor_note
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("None");

    format!(
        r#"You are a prompt optimization agent.

Rewrite the inputs below into one clear, deterministic, execution-ready instruction for a model that generates exam questions.

Rules:
1. Preserve the intent of the inputs exactly.
2. Do not add academic content, topics or assumptions.
3. Restrict question content to the summary.

The instruction must state the content scope, the number and types of questions, difficulty requirements, every constraint from the blueprint and the professor note, and the expected output format. Organize it under the headings: Objective, Content Scope, Constraints, Question Requirements, Output Format, Prohibited Actions.

CONTENT SUMMARY:
{summary}

EXAM BLUEPRINT (JSON):
{blueprint}

PROFESSOR NOTE:
{note}

Respond with JSON: {{"enhanced_prompt": "..."}}"#
    )
}

pub fn generate(instruction: &str) -> String {
    format!(
        r#"You are a controlled quiz generation engine.

Generate exam questions exactly as the instruction below specifies.

Rules:
1. Follow every constraint in the instruction, including question count, types, difficulty and marks.
2. Do not introduce topics outside its scope.
3. Do not add explanations or commentary.
4. "question_type" must be one of "mcq", "true_false", "one_word", "short_answer".
5. "marks" must be a positive integer.
6. For mcq questions list the choices in "options" and give the correct option text as "correct_answer".

INSTRUCTION:
{instruction}

Respond with JSON: {{"questions": [{{"question_text": "...", "question_type": "mcq", "options": ["..."], "correct_answer": "...", "marks": 1}}]}}"#
    )
}

pub fn answer_key(questions: &[Question]) -> String {
    let listing = serde_json::to_string_pretty(questions).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are an academic answer validation and completion engine.

Fill in "correct_answer" ONLY for questions where it is null.

Rules:
1. Never alter an existing answer.
2. Never reword or reorder questions.
3. Never add or remove questions; return exactly {count} entries in the same order.
4. Base answers strictly on the question text.
5. For mcq questions return only the text of the correct option.
6. If the correct answer cannot be determined with certainty, set "correct_answer" to "{unavailable}" and "confidence" to "low".

QUESTIONS:
{listing}

Respond with JSON: {{"questions": [{{"question_text": "...", "correct_answer": "...", "confidence": "high|low"}}]}}"#,
        count = questions.len(),
        unavailable = ANSWER_UNAVAILABLE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::types::QuestionType;

    #[test]
    fn test_summarize_truncates_document() {
        let text = "a".repeat(MAX_DOCUMENT_CHARS + 500);
        let prompt = summarize(&text);
        assert!(prompt.contains(&"a".repeat(MAX_DOCUMENT_CHARS)));
        assert!(!prompt.contains(&"a".repeat(MAX_DOCUMENT_CHARS + 1)));
    }

    #[test]
    fn test_enhance_includes_blueprint_and_note() {
        let blueprint: Blueprint = serde_json::from_str(r#"{"count": 5, "types": ["mcq"]}"#).unwrap();
        let prompt = enhance("Plants make sugar.", &blueprint, None);
        assert!(prompt.contains("\"count\": 5"));
        assert!(prompt.contains("PROFESSOR NOTE:\nNone"));

        let prompt = enhance("Plants make sugar.", &blueprint, Some("Avoid trick questions"));
        assert!(prompt.contains("Avoid trick questions"));
    }

    #[test]
    fn test_answer_key_states_expected_count() {
        let questions = vec![Question {
            question_text: "Capital of France?".to_string(),
            question_type: QuestionType::OneWord,
            options: None,
            correct_answer: None,
            marks: 1,
        }];
        let prompt = answer_key(&questions);
        assert!(prompt.contains("exactly 1 entries"));
        assert!(prompt.contains("Capital of France?"));
    }
}
