//! Grading prompt for short-answer evaluation.

use super::types::ShortAnswerItem;

pub fn grade_short_answers(items: &[ShortAnswerItem]) -> String {
    let listing = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are a fair but academically rigorous short-answer grading engine.

Grade each student answer on conceptual understanding, clarity and depth, not on similarity of wording to the reference answer.

Output rules:
1. Return exactly one result per input item, using its "question_id".
2. "awarded_marks" is an integer between 0 and that item's "max_marks".
3. Copy "max_marks" unchanged.
4. "confidence" is "high", "medium" or "low".
5. Do not explain, rewrite answers or invent missing content.

Rubric:
- Relevance gate: an answer that does not address the question gets 0.
- If the core concept is wrong, award at most 50% of max_marks.
- Correct explanation plus a relevant, factually correct, logically connected example: full marks.
- Correct explanation without an example on a 4 or 5 mark item: 75-85%.
- Example present but weak explanation: 65-75%.
- Partially correct: 40-55%.
- Only a minimal relevant idea: 20-30%.
- Incorrect or irrelevant: 5-10%.
- Minor grammar issues never reduce marks; penalize only when meaning becomes unclear.
- Accept alternative but logically valid viewpoints and structures without penalty.

ITEMS:
{listing}

Respond with JSON: {{"results": [{{"question_id": "...", "awarded_marks": 0, "max_marks": 0, "confidence": "high"}}]}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_prompt_lists_every_item() {
        let items: Vec<_> = (0..2)
            .map(|i| ShortAnswerItem {
                question_id: Uuid::new_v4(),
                question_text: format!("Explain concept {}", i),
                student_answer: "An answer".to_string(),
                reference_answer: None,
                max_marks: 5,
            })
            .collect();

        let prompt = grade_short_answers(&items);
        for item in &items {
            assert!(prompt.contains(&item.question_id.to_string()));
        }
        assert!(prompt.contains("Relevance gate"));
    }
}
