//! Request bodies for the text-summarization endpoint and extraction of its
//! answer. The host performs the HTTP call; nothing here touches the network.

use serde::Serialize;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::ledger::Comment;

const SYSTEM_INSTRUCTION: &str = "Provide bullet points\n\
Keep it short and sweet\n\
Summarize the student comments\n\
The bullet points should not be based on time\n\
Minimum number of bullet points but all info should be displayed";

const EXAMPLE_INPUT: &str = "ARJUN K\n\
{\"date\":\"10/08/2023\",\"time\":\"12:22:18 PM\",\"from\":\"teacher@school.edu\",\"comment\":\"Mother said he had food poisoning so took two days leave. Academically he is doing well in reading and writing. He asked about a transfer certificate only because he was unwell; she asked us not to take it seriously.\"}\n\
{\"date\":\"06/08/2024\",\"time\":\"12:23:14 PM\",\"from\":\"teacher@school.edu\",\"comment\":\"He is good, everything going well.\"}\n\
{\"date\":\"09/08/2024\",\"time\":\"10:26:26 AM\",\"from\":\"teacher@school.edu\",\"comment\":\"Parent says this school is better than the previous one.\"}\n";

const EXAMPLE_OUTPUT: &str = "* Student had food poisoning and took two days of leave.\n\
* Shows improvement in reading and writing.\n\
* Request for TC was due to illness and should not be taken seriously.\n\
* Overall good progress and positive feedback about the school.";

/// One line of the summarization input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub date: String,
    pub time: String,
    pub from: String,
    pub comment: String,
}

impl From<&Comment> for SummaryEntry {
    fn from(c: &Comment) -> Self {
        Self {
            date: c.date.clone(),
            time: c.time.clone(),
            from: c.author.clone(),
            comment: c.text.clone(),
        }
    }
}

/// Student name on the first line, then one JSON object per comment.
pub fn build_input(student_name: &str, entries: &[SummaryEntry]) -> anyhow::Result<String> {
    let mut out = String::new();
    out.push_str(student_name.trim());
    out.push('\n');
    for e in entries {
        out.push_str(&serde_json::to_string(e)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn build_request(input: &str) -> Value {
    json!({
        "contents": [
            { "role": "user", "parts": [{ "text": EXAMPLE_INPUT }] },
            { "role": "model", "parts": [{ "text": EXAMPLE_OUTPUT }] },
            { "role": "user", "parts": [{ "text": input }] }
        ],
        "systemInstruction": {
            "role": "user",
            "parts": [{ "text": SYSTEM_INSTRUCTION }]
        },
        "generationConfig": {
            "temperature": 1,
            "topK": 40,
            "topP": 0.95,
            "maxOutputTokens": 8192,
            "responseMimeType": "text/plain"
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryError {
    MissingText,
    Blocked(String),
}

impl Display for SummaryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingText => write!(f, "response has no candidates[0].content.parts[0].text"),
            Self::Blocked(reason) => write!(f, "prompt was blocked: {reason}"),
        }
    }
}

impl Error for SummaryError {}

pub fn extract_text(response: &Value) -> Result<String, SummaryError> {
    let text = response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str());
    match text {
        Some(t) => Ok(t.trim().to_string()),
        None => match response
            .pointer("/promptFeedback/blockReason")
            .and_then(|v| v.as_str())
        {
            Some(reason) => Err(SummaryError::Blocked(reason.to_string())),
            None => Err(SummaryError::MissingText),
        },
    }
}

/// Lines that start with a `*`, `-` or `•` marker, marker stripped.
pub fn bullet_points(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|l| {
            l.strip_prefix('*')
                .or_else(|| l.strip_prefix('-'))
                .or_else(|| l.strip_prefix('•'))
        })
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_has_name_line_then_json_lines() {
        let entries = vec![SummaryEntry {
            date: "06/08/2024".into(),
            time: "12:23:14 PM".into(),
            from: "t@school.edu".into(),
            comment: "He said \"fine\"".into(),
        }];
        let input = build_input(" ARJUN K ", &entries).expect("input");
        let mut lines = input.lines();
        assert_eq!(lines.next(), Some("ARJUN K"));
        assert_eq!(
            lines.next(),
            Some(r#"{"date":"06/08/2024","time":"12:23:14 PM","from":"t@school.edu","comment":"He said \"fine\""}"#)
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn request_puts_input_in_last_user_turn() {
        let body = build_request("X\n");
        let contents = body["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[2]["parts"][0]["text"], "X\n");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn extracts_text_or_reports_why_not() {
        let ok = json!({ "candidates": [{ "content": { "parts": [{ "text": "* a\n* b\n" }] } }] });
        assert_eq!(extract_text(&ok), Ok("* a\n* b".to_string()));
        assert_eq!(extract_text(&json!({})), Err(SummaryError::MissingText));
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert_eq!(extract_text(&blocked), Err(SummaryError::Blocked("SAFETY".into())));
    }

    #[test]
    fn bullets_skip_prose_and_blank_markers() {
        let text = "Summary:\n* First point\n- Second point\n*\n  • Third\nplain line";
        assert_eq!(
            bullet_points(text),
            vec!["First point", "Second point", "Third"]
        );
    }
}
