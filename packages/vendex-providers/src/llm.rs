use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::Result;

/// One system + user prompt exchange.
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
	pub system: &'a str,
	pub user: &'a str,
	pub max_tokens: u32,
	pub temperature: f32,
}

/// Sends a chat completion and returns the assistant text.
///
/// `Ok(None)` means the provider answered but produced no usable text. Parsing the text is the
/// caller's job; it may be fenced, prefixed with prose, or not JSON at all.
pub async fn complete(
	cfg: &vendex_config::LlmProviderConfig,
	request: &CompletionRequest<'_>,
) -> Result<Option<String>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": request.temperature,
		"max_tokens": request.max_tokens,
		"messages": [
			{ "role": "system", "content": request.system },
			{ "role": "user", "content": request.user },
		],
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	Ok(parse_completion_text(&json))
}

fn parse_completion_text(json: &Value) -> Option<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.filter(|content| !content.trim().is_empty())
		.map(str::to_string)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_first_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "role": "assistant", "content": "```json\n[\"a\"]\n```" } },
				{ "message": { "role": "assistant", "content": "ignored" } }
			]
		});

		assert_eq!(parse_completion_text(&json).as_deref(), Some("```json\n[\"a\"]\n```"));
	}

	#[test]
	fn blank_content_is_none() {
		let json = serde_json::json!({ "choices": [{ "message": { "content": "  \n" } }] });

		assert_eq!(parse_completion_text(&json), None);
	}

	#[test]
	fn missing_choices_is_none() {
		let json = serde_json::json!({ "error": { "message": "overloaded" } });

		assert_eq!(parse_completion_text(&json), None);
	}

	#[test]
	fn null_content_is_none() {
		let json = serde_json::json!({ "choices": [{ "message": { "content": null } }] });

		assert_eq!(parse_completion_text(&json), None);
	}
}
