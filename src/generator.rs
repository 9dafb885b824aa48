//! External code-generation call.
//!
//! One opaque request/response boundary: a free-text prompt goes to an
//! OpenAI-style chat-completions endpoint and a complete mapping of
//! relative file path → file content comes back as a single JSON object.
//! No streaming, no partial results.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::fileset::FileSet;
use crate::github::Issue;

const REQUEST_TIMEOUT_SECS: u64 = 300;

/// The system prompt sent with every generation request.
pub const SYSTEM_PROMPT: &str = r#"You are a Python code generator.

- Write only Python code, no other languages.
- If the requested solution should be a web application, implement it with Streamlit.
- Always generate a Dockerfile that can build and run the produced Python code
  (including Streamlit UI if present). Place the Dockerfile at the repository root
  and name it `Dockerfile`.
- Generate all files that are required for the program (multiple .py files,
  requirements.txt, README.md, etc.).
- Return the result as a single JSON object where each key is the filename
  (relative to the repository root) and each value is the complete file content.
- Do not include any additional text, explanations or markdown - the output
  must be pure JSON."#;

/// Build the per-issue user prompt from issue metadata.
///
/// A null issue body is treated as empty, and a fixed instruction suffix
/// asks for a single deliverable satisfying the request.
pub fn build_prompt(issue: &Issue) -> String {
    format!(
        "# Issue #{}: {}\n\n{}\n\n# Write a single Python script that satisfies the request.",
        issue.number,
        issue.title,
        issue.body.as_deref().unwrap_or("")
    )
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct CodeGenerator {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CodeGenerator {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Invoke the generation call and parse the returned file mapping.
    pub async fn generate(&self, prompt: &str) -> Result<FileSet> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": prompt},
                ],
                "response_format": {"type": "json_object"},
                "temperature": 0.2,
            }))
            .send()
            .await
            .context("Failed to send generation request")?
            .error_for_status()
            .context("Generation API returned error status")?
            .json::<ChatResponse>()
            .await
            .context("Failed to parse generation API response")?;

        let content = resp
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .context("Generation response contained no message content")?;

        parse_file_set(content)
    }
}

/// Parse the model output into a [`FileSet`].
///
/// The model is asked for pure JSON, but the extractor tolerates stray
/// text around the object.
pub fn parse_file_set(output: &str) -> Result<FileSet> {
    let json_str = extract_json_object(output)
        .context("No JSON object found in generation output")?;
    let value: serde_json::Value = serde_json::from_str(&json_str)
        .context("Failed to parse JSON from generation output")?;
    let Some(files) = FileSet::from_json(&value) else {
        bail!("Generation output is not an object of filename to file content");
    };
    if files.is_empty() {
        bail!("Generation output contained no files");
    }
    Ok(files)
}

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object.
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}
