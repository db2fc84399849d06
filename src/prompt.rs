use crate::criteria::Criterion;

/// Instruction placed ahead of the criteria lines.
pub const PROMPT_PREAMBLE: &str = "Please analyze the following sequence of video frames and answer the following questions with 'true' or 'false' and why in a JSON format - { id: <ID>, answer: true, why: \"\" } if the video clearly fulfills the criterion\n:\n\n";

/// Renders the prompt sent alongside the uploaded video.
///
/// Each criterion becomes one `ID <id>: <description>` line, in input order.
pub fn build_prompt(criteria: &[Criterion]) -> String {
    let questions: Vec<String> = criteria
        .iter()
        .map(|item| format!("ID {}: {}", item.id, item.description))
        .collect();

    let mut prompt = String::from(PROMPT_PREAMBLE);
    prompt.push_str(&questions.join("\n"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::parse_criteria;

    fn question_lines(prompt: &str) -> Vec<&str> {
        prompt.lines().filter(|line| line.starts_with("ID ")).collect()
    }

    #[test]
    fn single_criterion_line() {
        let criteria = parse_criteria(r#"[{"id":1,"description":"person waves"}]"#).unwrap();
        let prompt = build_prompt(&criteria);
        assert!(prompt.starts_with(PROMPT_PREAMBLE));
        assert!(prompt.lines().any(|line| line == "ID 1: person waves"));
    }

    #[test]
    fn lines_follow_input_order() {
        let criteria = parse_criteria(
            r#"[
                {"id": 10, "description": "first"},
                {"id": 2, "description": "second: with colon"},
                {"id": "c", "description": "third"}
            ]"#,
        )
        .unwrap();
        let prompt = build_prompt(&criteria);
        assert_eq!(
            question_lines(&prompt),
            vec!["ID 10: first", "ID 2: second: with colon", "ID c: third"]
        );
        assert!(prompt.ends_with("ID c: third"));
    }

    #[test]
    fn empty_criteria_yield_preamble_only() {
        let prompt = build_prompt(&[]);
        assert_eq!(prompt, PROMPT_PREAMBLE);
        assert!(question_lines(&prompt).is_empty());
    }

    #[test]
    fn deterministic() {
        let criteria = parse_criteria(r#"[{"id":1,"description":"a"},{"id":2,"description":"b"}]"#)
            .unwrap();
        assert_eq!(build_prompt(&criteria), build_prompt(&criteria));
    }

    #[test]
    fn preamble_asks_for_an_empty_why_string() {
        assert!(PROMPT_PREAMBLE.contains(r#"{ id: <ID>, answer: true, why: "" }"#));
        assert!(!PROMPT_PREAMBLE.contains("why: }"));
        assert!(PROMPT_PREAMBLE.ends_with("criterion\n:\n\n"));
    }
}
