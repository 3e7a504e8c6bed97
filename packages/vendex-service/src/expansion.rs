//! Query expansion: one search string in, up to `max_queries` alternative phrasings out.
//!
//! Expansion never fails. Any provider error or unusable answer degrades to searching with the
//! original query alone.

use std::{collections::HashSet, sync::Arc};

use serde_json::Value;
use tracing::warn;

use crate::{CompletionRequest, Degradation, LlmProvider};
use vendex_config::{LlmProviderConfig, SearchExpansion};
use vendex_domain::llm_json;

const SYSTEM_PROMPT: &str = "You expand search queries for a directory of medical and beauty \
vendors such as clinics, dermatologists, and salons. Reply with a JSON array of strings only. \
Each string is a short alternative search phrasing that keeps the user's intent, location, and \
language. Do not add explanations, keys, or Markdown.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expansion {
	/// Never empty.
	pub queries: Vec<String>,
	pub degraded: Option<Degradation>,
}
impl Expansion {
	pub fn original(query: &str) -> Self {
		Self { queries: vec![query.to_string()], degraded: None }
	}

	fn fallback(query: &str) -> Self {
		Self { queries: vec![query.to_string()], degraded: Some(Degradation::ExpansionFailed) }
	}
}

pub struct QueryExpander {
	llm: Arc<dyn LlmProvider>,
	llm_cfg: Arc<LlmProviderConfig>,
	cfg: SearchExpansion,
}
impl QueryExpander {
	pub fn new(
		llm: Arc<dyn LlmProvider>,
		llm_cfg: Arc<LlmProviderConfig>,
		cfg: SearchExpansion,
	) -> Self {
		Self { llm, llm_cfg, cfg }
	}

	pub async fn expand(&self, query: &str) -> Expansion {
		let user = build_user_prompt(query, self.cfg.max_queries);
		let request = CompletionRequest {
			system: SYSTEM_PROMPT,
			user: &user,
			max_tokens: self.cfg.max_tokens,
			temperature: self.cfg.temperature,
		};
		let raw = match self.llm.complete(&self.llm_cfg, request).await {
			Ok(Some(text)) => text,
			Ok(None) => {
				warn!("Query expansion returned no text; falling back to original query.");

				return Expansion::fallback(query);
			},
			Err(err) => {
				warn!(error = %err, "Query expansion failed; falling back to original query.");

				return Expansion::fallback(query);
			},
		};
		let parsed: Vec<Value> = match llm_json::parse_array(&raw) {
			Ok(values) => values,
			Err(err) => {
				warn!(
					error = %err,
					"Query expansion returned invalid JSON; falling back to original query."
				);

				return Expansion::fallback(query);
			},
		};
		let phrasings = parsed.into_iter().filter_map(|value| match value {
			Value::String(text) => Some(text),
			_ => None,
		});
		let queries =
			normalize_queries(phrasings, query, self.cfg.include_original, self.cfg.max_queries);

		if queries.is_empty() {
			warn!("Query expansion produced no usable phrasings; falling back to original query.");

			return Expansion::fallback(query);
		}

		Expansion { queries, degraded: None }
	}
}

fn build_user_prompt(query: &str, max_queries: u32) -> String {
	format!(
		"Return a JSON array of at most {max_queries} alternative search phrasings.\n\
Example: [\"phrasing one\", \"phrasing two\"]\nOriginal query:\n{query}"
	)
}

fn normalize_queries<I>(
	queries: I,
	original: &str,
	include_original: bool,
	max_queries: u32,
) -> Vec<String>
where
	I: IntoIterator<Item = String>,
{
	let max = max_queries as usize;
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	if include_original {
		push_query(&mut out, &mut seen, original);
	}
	for query in queries {
		if out.len() >= max {
			break;
		}

		push_query(&mut out, &mut seen, &query);
	}

	out.truncate(max);

	out
}

fn push_query(out: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return;
	}
	if seen.insert(trimmed.to_lowercase()) {
		out.push(trimmed.to_string());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn strings(values: &[&str]) -> Vec<String> {
		values.iter().map(|value| value.to_string()).collect()
	}

	#[test]
	fn normalize_queries_includes_original_and_dedupes() {
		let normalized = normalize_queries(strings(&["Alpha ", "beta", "alpha"]), "alpha", true, 3);

		assert_eq!(normalized, strings(&["alpha", "beta"]));
	}

	#[test]
	fn normalize_queries_skips_blank_entries_and_caps() {
		let queries = strings(&["", "  ", "one", "two", "three", "four"]);
		let normalized = normalize_queries(queries, "q", false, 3);

		assert_eq!(normalized, strings(&["one", "two", "three"]));
	}

	#[test]
	fn normalize_queries_counts_original_against_cap() {
		let normalized = normalize_queries(strings(&["one", "two", "three"]), "zero", true, 2);

		assert_eq!(normalized, strings(&["zero", "one"]));
	}

	#[test]
	fn user_prompt_carries_query_and_cap() {
		let prompt = build_user_prompt("강남 피부과 추천", 3);

		assert!(prompt.contains("at most 3"));
		assert!(prompt.ends_with("강남 피부과 추천"));
	}
}
