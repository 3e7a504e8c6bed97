use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
	Degradation, Error, Expansion, Result, ScoredVendor, Suitability, VendexService,
	retrieval::CandidatePool,
};
use vendex_config::SearchDynamic;
use vendex_domain::tier::{self, Tier, Tiered};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExpansionMode {
	Off,
	Always,
	Dynamic,
}
impl ExpansionMode {
	fn resolve(raw: &str) -> Self {
		match raw {
			"always" => Self::Always,
			"dynamic" => Self::Dynamic,
			_ => Self::Off,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub offset: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchItem {
	pub vendor_id: Uuid,
	pub name: String,
	pub description: Option<String>,
	pub categories: Vec<String>,
	pub address: Option<String>,
	pub service_areas: Vec<String>,
	pub similarity: f32,
	pub relevance_score: f32,
	pub match_reason: String,
	pub status: Option<Suitability>,
	pub tier: Tier,
	pub is_advertised: bool,
	pub is_pinned: bool,
	pub priority_score: i32,
	#[serde(with = "time::serde::rfc3339::option")]
	pub advertisement_expires_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub pin_until: Option<OffsetDateTime>,
}
impl From<Tiered<ScoredVendor>> for SearchItem {
	fn from(tiered: Tiered<ScoredVendor>) -> Self {
		let Tiered { vendor, tier, is_advertised, is_pinned, priority_score } = tiered;
		let ScoredVendor { candidate, relevance_score, match_reason, status } = vendor;

		Self {
			vendor_id: candidate.id,
			name: candidate.name,
			description: candidate.description,
			categories: candidate.categories,
			address: candidate.address,
			service_areas: candidate.service_areas,
			similarity: candidate.similarity,
			relevance_score,
			match_reason,
			status,
			tier,
			is_advertised,
			is_pinned,
			priority_score,
			advertisement_expires_at: candidate.advertisement_expires_at,
			pin_until: candidate.pin_until,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub search_id: Uuid,
	pub query: String,
	pub expanded_queries: Vec<String>,
	/// Result count before pagination.
	pub total: usize,
	pub items: Vec<SearchItem>,
	/// Stages that fell back to a weaker result. Empty on a fully healthy search.
	pub degraded: Vec<Degradation>,
}

#[derive(Debug, Default)]
struct Fanout {
	succeeded: usize,
	failed: usize,
}

impl VendexService {
	/// Expands, retrieves, scores, and tiers vendors for one free-text query.
	///
	/// Language-model failures never fail the search; they surface only in
	/// [`SearchResponse::degraded`]. Retrieval failing on every branch yields an empty result.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let page = &self.cfg.search.page;
		let limit = req.limit.unwrap_or(page.default_limit);

		if limit == 0 {
			return Err(Error::InvalidRequest {
				message: "limit must be greater than zero.".to_string(),
			});
		}

		let limit = limit.min(page.max_limit) as usize;
		let offset = req.offset.unwrap_or(0) as usize;
		let search_id = Uuid::new_v4();
		let mut degraded = Vec::new();
		let mut pool = CandidatePool::default();
		let mut fanout = Fanout::default();
		let expansion = match ExpansionMode::resolve(&self.cfg.search.expansion.mode) {
			ExpansionMode::Off => {
				let expansion = Expansion::original(query);

				self.retrieve_all(&expansion.queries, &mut pool, &mut fanout).await;

				expansion
			},
			ExpansionMode::Always => {
				let expansion = self.expander.expand(query).await;

				self.retrieve_all(&expansion.queries, &mut pool, &mut fanout).await;

				expansion
			},
			ExpansionMode::Dynamic => {
				let baseline = vec![query.to_string()];

				self.retrieve_all(&baseline, &mut pool, &mut fanout).await;

				if should_expand_dynamic(pool.len(), pool.top_similarity(), &self.cfg.search.dynamic)
				{
					let expansion = self.expander.expand(query).await;
					let baseline_key = query.to_lowercase();
					let remaining: Vec<String> = expansion
						.queries
						.iter()
						.filter(|expanded| expanded.to_lowercase() != baseline_key)
						.cloned()
						.collect();

					self.retrieve_all(&remaining, &mut pool, &mut fanout).await;

					expansion
				} else {
					Expansion::original(query)
				}
			},
		};

		degraded.extend(expansion.degraded);

		if fanout.succeeded == 0 {
			degraded.push(Degradation::RetrievalFailed);
		} else if fanout.failed > 0 {
			degraded.push(Degradation::RetrievalPartial);
		}

		let candidates = pool.into_ranked();
		let candidate_count = candidates.len();
		let scoring = self.scorer.score(query, &candidates).await;

		degraded.extend(scoring.degraded);

		let mut scored = scoring.vendors;

		// Relevance only orders vendors that share a tier and priority.
		scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

		let tiered = tier::classify_and_sort(scored, OffsetDateTime::now_utc());
		let total = tiered.len();
		let items: Vec<SearchItem> =
			tiered.into_iter().skip(offset).take(limit).map(SearchItem::from).collect();
		let degraded_tags: Vec<&str> = degraded.iter().map(|tag| tag.as_str()).collect();

		info!(
			search_id = %search_id,
			expanded_query_count = expansion.queries.len(),
			candidate_count,
			result_count = total,
			degraded = ?degraded_tags,
			"Vendor search completed."
		);

		Ok(SearchResponse {
			search_id,
			query: query.to_string(),
			expanded_queries: expansion.queries,
			total,
			items,
			degraded,
		})
	}

	/// Runs one retrieval per query with bounded concurrency and merges whatever succeeds.
	async fn retrieve_all(
		&self,
		queries: &[String],
		pool: &mut CandidatePool,
		fanout: &mut Fanout,
	) {
		let semaphore =
			Arc::new(Semaphore::new(self.cfg.search.retrieval.max_concurrency.max(1) as usize));
		let limit = self.cfg.search.retrieval.candidate_k;
		let mut branches = JoinSet::new();

		for query in queries {
			let retriever = self.retriever.clone();
			let semaphore = semaphore.clone();
			let query = query.clone();

			branches.spawn(async move {
				let _permit = semaphore.acquire_owned().await;
				let outcome = retriever.retrieve(&query, limit).await;

				(query, outcome)
			});
		}

		while let Some(joined) = branches.join_next().await {
			match joined {
				Ok((_, Ok(candidates))) => {
					fanout.succeeded += 1;

					pool.extend(candidates);
				},
				Ok((query, Err(err))) => {
					warn!(query = %query, error = %err, "Retrieval branch failed.");

					fanout.failed += 1;
				},
				Err(err) => {
					warn!(error = %err, "Retrieval branch task did not complete.");

					fanout.failed += 1;
				},
			}
		}
	}
}

fn should_expand_dynamic(
	candidate_count: usize,
	top_similarity: f32,
	cfg: &SearchDynamic,
) -> bool {
	candidate_count < cfg.min_candidates as usize || top_similarity < cfg.min_top_similarity
}
