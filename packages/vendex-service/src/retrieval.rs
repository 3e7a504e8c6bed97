//! Candidate retrieval: the Postgres-backed default retriever and the merge of fan-out branches.

use std::{collections::HashMap, sync::Arc};

use sqlx::PgPool;
use uuid::Uuid;

use crate::{BoxFuture, EmbeddingProvider, Error, Result, VendorCandidate, VendorRetriever};
use vendex_config::EmbeddingProviderConfig;
use vendex_storage::{models::VendorMatch, queries};

/// Embeds the search string and runs a pgvector similarity query.
pub struct PgVendorRetriever {
	pool: PgPool,
	embedding_cfg: EmbeddingProviderConfig,
	embedding: Arc<dyn EmbeddingProvider>,
	min_similarity: f32,
}
impl PgVendorRetriever {
	pub fn new(
		pool: PgPool,
		embedding_cfg: EmbeddingProviderConfig,
		embedding: Arc<dyn EmbeddingProvider>,
		min_similarity: f32,
	) -> Self {
		Self { pool, embedding_cfg, embedding, min_similarity }
	}

	async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let texts = vec![query.to_string()];
		let mut vectors = self.embedding.embed(&self.embedding_cfg, &texts).await?;
		let vector = vectors.pop().ok_or_else(|| Error::Provider {
			message: "Embedding provider returned no vectors.".to_string(),
		})?;

		if vector.len() != self.embedding_cfg.dimensions as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding has {} dimensions; expected {}.",
					vector.len(),
					self.embedding_cfg.dimensions
				),
			});
		}

		Ok(vector)
	}
}
impl VendorRetriever for PgVendorRetriever {
	fn retrieve<'a>(
		&'a self,
		query: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<VendorCandidate>>> {
		Box::pin(async move {
			let vector = self.embed_query(query).await?;
			let rows =
				queries::search_vendors_by_vector(&self.pool, &vector, limit, self.min_similarity)
					.await?;

			Ok(rows.into_iter().map(VendorCandidate::from).collect())
		})
	}
}

impl From<VendorMatch> for VendorCandidate {
	fn from(row: VendorMatch) -> Self {
		Self {
			id: row.vendor_id,
			name: row.name,
			description: row.description,
			categories: row.categories,
			address: row.address,
			service_areas: row.service_areas,
			similarity: row.similarity as f32,
			advertisement_expires_at: row.advertisement_expires_at,
			pin_until: row.pin_until,
			priority_score: row.priority_score,
		}
	}
}

/// Candidates merged across retrieval branches by vendor id, keeping the highest similarity seen.
///
/// Insertion order does not affect the result, so branches may be merged as they complete.
/// Similarities are clamped into `[0, 1]`; non-finite values count as zero.
#[derive(Debug, Default)]
pub struct CandidatePool {
	by_id: HashMap<Uuid, VendorCandidate>,
}
impl CandidatePool {
	pub fn extend<I>(&mut self, candidates: I)
	where
		I: IntoIterator<Item = VendorCandidate>,
	{
		for candidate in candidates {
			self.insert(candidate);
		}
	}

	pub fn insert(&mut self, candidate: VendorCandidate) {
		let similarity = sanitize_similarity(candidate.similarity);

		match self.by_id.get_mut(&candidate.id) {
			Some(existing) if existing.similarity >= similarity => {},
			Some(existing) => *existing = VendorCandidate { similarity, ..candidate },
			None => {
				self.by_id.insert(candidate.id, VendorCandidate { similarity, ..candidate });
			},
		}
	}

	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	pub fn top_similarity(&self) -> f32 {
		self.by_id.values().map(|candidate| candidate.similarity).fold(0.0, f32::max)
	}

	/// Most similar first; ties break on vendor id so the order is deterministic.
	pub fn into_ranked(self) -> Vec<VendorCandidate> {
		let mut candidates: Vec<VendorCandidate> = self.by_id.into_values().collect();

		candidates
			.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.id.cmp(&b.id)));

		candidates
	}
}

fn sanitize_similarity(similarity: f32) -> f32 {
	if similarity.is_finite() { similarity.clamp(0.0, 1.0) } else { 0.0 }
}
