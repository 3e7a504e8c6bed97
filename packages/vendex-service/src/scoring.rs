//! LLM relevance scoring of retrieval candidates.
//!
//! Candidates are scored in fixed-size batches dispatched concurrently. A batch that fails or
//! returns unusable text contributes no scores and never aborts its siblings. When no batch yields
//! a score, every candidate falls back to a score derived from its retrieval similarity.

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
	time::Duration,
};

use serde::Serialize;
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
	CompletionRequest, Degradation, LlmProvider, ScoredVendor, Suitability, VendorCandidate,
};
use vendex_config::{LlmProviderConfig, SearchScoring};
use vendex_domain::llm_json;

pub const FALLBACK_REASON: &str = "similarity-based fallback";

const UNSPECIFIED_CATEGORY: &str = "미지정";
const DEFAULT_SCORE: f32 = 5.0;
const MAX_SCORE: f32 = 10.0;
const SYSTEM_PROMPT: &str = "You rate how well medical and beauty vendors match a user's search. \
For every vendor in the input, return one object with these keys: \
\"vendor_id\" (copied from the input), \"score\" (number from 0 to 10), \
\"reason\" (one short sentence in the user's language), and \
\"status\" (\"suitable\", \"pending\", or \"unsuitable\"). \
Use \"unsuitable\" only when the vendor clearly cannot serve the request. \
Reply with a JSON array only, without Markdown or commentary.";

#[derive(Clone, Debug, PartialEq)]
pub struct Scoring {
	pub vendors: Vec<ScoredVendor>,
	pub degraded: Option<Degradation>,
}
impl Scoring {
	fn fallback(candidates: &[VendorCandidate], reason: Degradation) -> Self {
		Self { vendors: similarity_fallback(candidates), degraded: Some(reason) }
	}
}

pub struct RelevanceScorer {
	llm: Arc<dyn LlmProvider>,
	llm_cfg: Arc<LlmProviderConfig>,
	cfg: SearchScoring,
}
impl RelevanceScorer {
	pub fn new(
		llm: Arc<dyn LlmProvider>,
		llm_cfg: Arc<LlmProviderConfig>,
		cfg: SearchScoring,
	) -> Self {
		Self { llm, llm_cfg, cfg }
	}

	/// Scores `candidates` against the original user `query`.
	///
	/// The whole stage is bounded by `search.scoring.timeout_ms`; on expiry in-flight batches are
	/// cancelled and the similarity fallback is returned.
	pub async fn score(&self, query: &str, candidates: &[VendorCandidate]) -> Scoring {
		if candidates.is_empty() {
			return Scoring { vendors: Vec::new(), degraded: None };
		}
		if !self.cfg.enabled {
			return Scoring::fallback(candidates, Degradation::ScoringDisabled);
		}

		let timeout = Duration::from_millis(self.cfg.timeout_ms);

		match tokio::time::timeout(timeout, self.score_batches(query, candidates)).await {
			Ok(scoring) => scoring,
			Err(_) => {
				warn!(
					timeout_ms = self.cfg.timeout_ms,
					candidate_count = candidates.len(),
					"Relevance scoring timed out; using similarity fallback."
				);

				Scoring::fallback(candidates, Degradation::ScoringTimedOut)
			},
		}
	}

	async fn score_batches(&self, query: &str, candidates: &[VendorCandidate]) -> Scoring {
		let batch_size = self.cfg.batch_size.max(1) as usize;
		let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrency.max(1) as usize));
		let mut batches = JoinSet::new();
		let mut failed_batches = 0_usize;

		for (index, batch) in candidates.chunks(batch_size).enumerate() {
			let user = match build_user_prompt(query, batch) {
				Ok(user) => user,
				Err(err) => {
					warn!(batch = index, error = %err, "Failed to encode scoring batch.");

					failed_batches += 1;

					continue;
				},
			};
			let llm = self.llm.clone();
			let llm_cfg = self.llm_cfg.clone();
			let semaphore = semaphore.clone();
			let max_tokens = self.cfg.max_tokens;
			let temperature = self.cfg.temperature;
			let members: HashSet<Uuid> = batch.iter().map(|candidate| candidate.id).collect();

			batches.spawn(async move {
				let _permit = semaphore.acquire_owned().await;

				debug!(batch = index, size = members.len(), "Scoring batch.");

				let request =
					CompletionRequest { system: SYSTEM_PROMPT, user: &user, max_tokens, temperature };
				let outcome = llm.complete(&llm_cfg, request).await;

				(index, members, outcome)
			});
		}

		let mut entries = HashMap::new();

		while let Some(joined) = batches.join_next().await {
			let (index, members, outcome) = match joined {
				Ok(done) => done,
				Err(err) => {
					warn!(error = %err, "Scoring batch task did not complete.");

					failed_batches += 1;

					continue;
				},
			};
			let raw = match outcome {
				Ok(Some(text)) => text,
				Ok(None) => {
					warn!(batch = index, "Scoring batch returned no text.");

					failed_batches += 1;

					continue;
				},
				Err(err) => {
					warn!(batch = index, error = %err, "Scoring batch request failed.");

					failed_batches += 1;

					continue;
				},
			};

			match llm_json::parse_array::<Value>(&raw) {
				Ok(values) =>
					if collect_batch_entries(&values, &members, &mut entries) == 0 {
						warn!(batch = index, "Scoring batch matched none of its vendors.");

						failed_batches += 1;
					},
				Err(err) => {
					warn!(batch = index, error = %err, "Scoring batch returned invalid JSON.");

					failed_batches += 1;
				},
			}
		}

		if entries.is_empty() {
			warn!(
				candidate_count = candidates.len(),
				failed_batches,
				"Relevance scoring produced no scores; using similarity fallback."
			);

			return Scoring::fallback(candidates, Degradation::ScoringFailed);
		}

		let vendors = apply_scores(candidates, entries);
		let degraded = (failed_batches > 0).then_some(Degradation::ScoringBatchFailed);

		Scoring { vendors, degraded }
	}
}

/// Scores every candidate as `min(10, similarity * 10)` with [`FALLBACK_REASON`].
pub fn similarity_fallback(candidates: &[VendorCandidate]) -> Vec<ScoredVendor> {
	candidates
		.iter()
		.map(|candidate| ScoredVendor {
			candidate: candidate.clone(),
			relevance_score: clamp_score(candidate.similarity * MAX_SCORE),
			match_reason: FALLBACK_REASON.to_string(),
			status: None,
		})
		.collect()
}

#[derive(Debug, Serialize)]
struct ScoringRecord<'a> {
	vendor_id: String,
	name: &'a str,
	description: &'a str,
	categories: String,
	address: &'a str,
	service_areas: String,
	similarity: f32,
}
impl<'a> From<&'a VendorCandidate> for ScoringRecord<'a> {
	fn from(candidate: &'a VendorCandidate) -> Self {
		let categories = if candidate.categories.is_empty() {
			UNSPECIFIED_CATEGORY.to_string()
		} else {
			candidate.categories.join(", ")
		};

		Self {
			vendor_id: candidate.id.to_string(),
			name: &candidate.name,
			description: candidate.description.as_deref().unwrap_or_default(),
			categories,
			address: candidate.address.as_deref().unwrap_or_default(),
			service_areas: candidate.service_areas.join(", "),
			similarity: candidate.similarity,
		}
	}
}

#[derive(Debug, PartialEq)]
struct ScoreEntry {
	vendor_id: Uuid,
	score: f32,
	reason: Option<String>,
	status: Option<Suitability>,
}

fn build_user_prompt(query: &str, batch: &[VendorCandidate]) -> serde_json::Result<String> {
	let records: Vec<ScoringRecord<'_>> = batch.iter().map(ScoringRecord::from).collect();
	let records = serde_json::to_string(&records)?;

	Ok(format!("Search query:\n{query}\n\nVendors:\n{records}"))
}

/// Keeps entries naming a vendor of this batch and returns how many matched.
fn collect_batch_entries(
	values: &[Value],
	members: &HashSet<Uuid>,
	entries: &mut HashMap<Uuid, ScoreEntry>,
) -> usize {
	let mut matched = 0;

	for entry in values.iter().filter_map(parse_entry) {
		if !members.contains(&entry.vendor_id) {
			continue;
		}

		matched += 1;

		entries.entry(entry.vendor_id).or_insert(entry);
	}

	matched
}

/// Reads one model-produced score object. Entries without a recognizable vendor id are skipped.
fn parse_entry(value: &Value) -> Option<ScoreEntry> {
	let object = value.as_object()?;
	let vendor_id = object
		.get("vendor_id")
		.or_else(|| object.get("id"))
		.and_then(Value::as_str)
		.and_then(|raw| Uuid::parse_str(raw.trim()).ok())?;
	let score = object.get("score").and_then(parse_score).unwrap_or(DEFAULT_SCORE);
	let reason = object
		.get("reason")
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|reason| !reason.is_empty())
		.map(str::to_string);
	let status = object.get("status").and_then(Value::as_str).and_then(Suitability::parse);

	Some(ScoreEntry { vendor_id, score: clamp_score(score), reason, status })
}

fn parse_score(value: &Value) -> Option<f32> {
	let score = match value {
		Value::Number(number) => number.as_f64()? as f32,
		Value::String(text) => text.trim().parse::<f32>().ok()?,
		_ => return None,
	};

	score.is_finite().then_some(score)
}

fn clamp_score(score: f32) -> f32 {
	if score.is_finite() { score.clamp(0.0, MAX_SCORE) } else { DEFAULT_SCORE }
}

fn apply_scores(
	candidates: &[VendorCandidate],
	mut entries: HashMap<Uuid, ScoreEntry>,
) -> Vec<ScoredVendor> {
	let mut emitted = HashSet::new();
	let mut vendors = Vec::with_capacity(candidates.len());

	for candidate in candidates {
		if !emitted.insert(candidate.id) {
			continue;
		}

		let Some(entry) = entries.remove(&candidate.id) else {
			continue;
		};

		if entry.status == Some(Suitability::Unsuitable) {
			info!(
				vendor_id = %candidate.id,
				vendor_name = %candidate.name,
				reason = entry.reason.as_deref().unwrap_or_default(),
				"Excluded vendor judged unsuitable."
			);

			continue;
		}

		vendors.push(ScoredVendor {
			candidate: candidate.clone(),
			relevance_score: entry.score,
			match_reason: entry.reason.unwrap_or_else(|| FALLBACK_REASON.to_string()),
			status: entry.status,
		});
	}

	vendors
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn candidate(similarity: f32) -> VendorCandidate {
		VendorCandidate {
			id: Uuid::new_v4(),
			name: "Gangnam Skin Clinic".to_string(),
			description: None,
			categories: Vec::new(),
			address: Some("Seoul Gangnam-gu".to_string()),
			service_areas: vec!["Gangnam".to_string(), "Seocho".to_string()],
			similarity,
			advertisement_expires_at: None,
			pin_until: None,
			priority_score: None,
		}
	}

	#[test]
	fn record_marks_missing_categories_unspecified() {
		let vendor = candidate(0.8);
		let record = ScoringRecord::from(&vendor);

		assert_eq!(record.categories, UNSPECIFIED_CATEGORY);
		assert_eq!(record.description, "");
		assert_eq!(record.service_areas, "Gangnam, Seocho");
	}

	#[test]
	fn user_prompt_embeds_query_and_records() {
		let vendor = candidate(0.8);
		let prompt = build_user_prompt("강남 피부과 추천", std::slice::from_ref(&vendor))
			.expect("Prompt should encode.");

		assert!(prompt.contains("강남 피부과 추천"));
		assert!(prompt.contains(&vendor.id.to_string()));
	}

	#[test]
	fn entry_scores_are_clamped_and_defaulted() {
		let id = Uuid::new_v4();
		let high = parse_entry(&json!({ "vendor_id": id.to_string(), "score": 42 }))
			.expect("Entry should parse.");
		let low = parse_entry(&json!({ "vendor_id": id.to_string(), "score": -3.5 }))
			.expect("Entry should parse.");
		let text = parse_entry(&json!({ "vendor_id": id.to_string(), "score": "7.5" }))
			.expect("Entry should parse.");
		let junk = parse_entry(&json!({ "vendor_id": id.to_string(), "score": "high" }))
			.expect("Entry should parse.");

		assert_eq!(high.score, 10.0);
		assert_eq!(low.score, 0.0);
		assert_eq!(text.score, 7.5);
		assert_eq!(junk.score, DEFAULT_SCORE);
		assert_eq!(junk.reason, None);
	}

	#[test]
	fn entry_status_is_case_insensitive_and_lenient() {
		let id = Uuid::new_v4();
		let unsuitable =
			parse_entry(&json!({ "id": id.to_string(), "status": " Unsuitable " })).expect("parse");
		let unknown =
			parse_entry(&json!({ "vendor_id": id.to_string(), "status": "maybe" })).expect("parse");

		assert_eq!(unsuitable.status, Some(Suitability::Unsuitable));
		assert_eq!(unknown.status, None);
	}

	#[test]
	fn entry_without_vendor_id_is_skipped() {
		assert_eq!(parse_entry(&json!({ "score": 9 })), None);
		assert_eq!(parse_entry(&json!({ "vendor_id": "not-a-uuid", "score": 9 })), None);
		assert_eq!(parse_entry(&json!("text")), None);
	}

	#[test]
	fn batch_entries_ignore_foreign_vendor_ids() {
		let member = Uuid::new_v4();
		let members = HashSet::from([member]);
		let mut entries = HashMap::new();
		let values = vec![
			json!({ "vendor_id": Uuid::new_v4().to_string(), "score": 9 }),
			json!({ "vendor_id": member.to_string(), "score": 4 }),
		];

		assert_eq!(collect_batch_entries(&values, &members, &mut entries), 1);
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[&member].score, 4.0);
		assert_eq!(collect_batch_entries(&values[..1], &members, &mut HashMap::new()), 0);
	}

	#[test]
	fn fallback_scales_similarity() {
		let scored = similarity_fallback(&[candidate(0.42), candidate(1.5)]);

		assert!((scored[0].relevance_score - 4.2).abs() < 1e-4);
		assert_eq!(scored[1].relevance_score, 10.0);
		assert!(scored.iter().all(|vendor| vendor.match_reason == FALLBACK_REASON));
	}

	#[test]
	fn apply_scores_drops_unsuitable_and_omitted() {
		let kept = candidate(0.9);
		let rejected = candidate(0.8);
		let omitted = candidate(0.7);
		let mut entries = HashMap::new();

		entries.insert(
			kept.id,
			ScoreEntry { vendor_id: kept.id, score: 8.0, reason: None, status: None },
		);
		entries.insert(
			rejected.id,
			ScoreEntry {
				vendor_id: rejected.id,
				score: 9.0,
				reason: Some("Hair salon only.".to_string()),
				status: Some(Suitability::Unsuitable),
			},
		);

		let scored = apply_scores(&[kept.clone(), rejected, omitted], entries);

		assert_eq!(scored.len(), 1);
		assert_eq!(scored[0].candidate.id, kept.id);
		assert_eq!(scored[0].match_reason, FALLBACK_REASON);
	}
}
