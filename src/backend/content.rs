//! Request and response shapes shared by the Gemini-family backends
//!
//! Both the API-key endpoint and the Code Assist endpoint speak the
//! `generateContent` format: a list of contents made of parts, answered by
//! candidates made of parts. Parts may be flagged as model thoughts.

use base64::Engine;
use serde_json::{json, Value};

/// Build the user turn carrying the prompt and the inline image
pub fn user_content(prompt: &str, image: &[u8], mime_type: &str) -> Value {
    let data = base64::engine::general_purpose::STANDARD.encode(image);
    json!({
        "role": "user",
        "parts": [
            { "text": prompt },
            { "inlineData": { "mimeType": mime_type, "data": data } }
        ]
    })
}

/// Text of the first candidate, split into answer and thought parts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CandidateText {
    pub answer: Vec<String>,
    pub thoughts: Vec<String>,
}

/// Why a response yielded no candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoCandidate {
    /// The prompt was rejected, with the reported reason
    Blocked(String),
    /// `candidates` missing or empty
    Missing,
}

/// Pull the parts of `candidates[0]` out of a `generateContent` response body
///
/// Parts carrying a truthy `thought` (or `thinking`) flag go to `thoughts`.
/// Parts without text (function calls, inline data) are skipped.
pub fn first_candidate(response: &Value) -> Result<CandidateText, NoCandidate> {
    let candidate = match response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    {
        Some(candidate) => candidate,
        None => {
            let reason = response
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str);
            return Err(match reason {
                Some(reason) => NoCandidate::Blocked(reason.to_string()),
                None => NoCandidate::Missing,
            });
        }
    };

    let mut text = CandidateText::default();
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for part in parts {
        let Some(part_text) = part.get("text").and_then(Value::as_str) else {
            continue;
        };
        if is_thought(part) {
            text.thoughts.push(part_text.to_string());
        } else {
            text.answer.push(part_text.to_string());
        }
    }

    Ok(text)
}

fn is_thought(part: &Value) -> bool {
    ["thought", "thinking"]
        .iter()
        .any(|flag| part.get(flag).and_then(Value::as_bool).unwrap_or(false))
}
