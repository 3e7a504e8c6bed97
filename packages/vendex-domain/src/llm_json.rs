//! Best-effort recovery of a JSON array from free-form model output.
//!
//! Models wrap answers in Markdown fences, prepend prose, or append commentary. Callers hand the
//! raw completion text here and get back either a parsed array or a typed reason why none could be
//! recovered.

use serde::de::DeserializeOwned;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Model output is empty.")]
	Empty,
	#[error("Model output does not contain a complete JSON array.")]
	MissingArray,
	#[error("Model output array is not valid JSON: {0}")]
	InvalidJson(#[from] serde_json::Error),
}

/// Returns the body of the first Markdown code fence, or the trimmed input when there is none.
///
/// An unterminated fence yields everything after the opening line.
pub fn strip_code_fences(raw: &str) -> &str {
	let trimmed = raw.trim();
	let Some(open) = trimmed.find("```") else {
		return trimmed;
	};
	let after_ticks = &trimmed[open + 3..];
	// Skip an optional language tag such as `json` on the opening line.
	let body_start = after_ticks.find('\n').map(|idx| idx + 1).unwrap_or(0);
	let body = &after_ticks[body_start..];

	match body.find("```") {
		Some(close) => body[..close].trim(),
		None => body.trim(),
	}
}

/// Locates the first balanced `[...]` span, ignoring brackets inside JSON strings.
pub fn extract_json_array(raw: &str) -> Option<&str> {
	let start = raw.find('[')?;
	let mut depth = 0_usize;
	let mut in_string = false;
	let mut escaped = false;

	for (offset, ch) in raw[start..].char_indices() {
		if in_string {
			match ch {
				_ if escaped => escaped = false,
				'\\' => escaped = true,
				'"' => in_string = false,
				_ => {},
			}

			continue;
		}

		match ch {
			'"' => in_string = true,
			'[' => depth += 1,
			']' => {
				depth -= 1;

				if depth == 0 {
					return Some(&raw[start..start + offset + 1]);
				}
			},
			_ => {},
		}
	}

	None
}

pub fn parse_array<T>(raw: &str) -> Result<Vec<T>>
where
	T: DeserializeOwned,
{
	if raw.trim().is_empty() {
		return Err(Error::Empty);
	}

	let unfenced = strip_code_fences(raw);
	let array = extract_json_array(unfenced)
		.or_else(|| extract_json_array(raw))
		.ok_or(Error::MissingArray)?;

	Ok(serde_json::from_str(array)?)
}
