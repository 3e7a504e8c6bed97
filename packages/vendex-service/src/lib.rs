pub mod expansion;
pub mod retrieval;
pub mod scoring;
pub mod search;
pub mod vendor;

mod error;

pub use error::{Error, Result};
pub use expansion::{Expansion, QueryExpander};
pub use retrieval::PgVendorRetriever;
pub use scoring::{FALLBACK_REASON, RelevanceScorer, Scoring};
pub use search::{SearchItem, SearchRequest, SearchResponse};
pub use vendex_providers::llm::CompletionRequest;
pub use vendor::{ScoredVendor, Suitability, VendorCandidate};

use std::{future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use vendex_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use vendex_providers::{embedding, llm};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The language-model capability. `Ok(None)` is an answer with no usable text.
pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: CompletionRequest<'a>,
	) -> BoxFuture<'a, Result<Option<String>>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Turns one search string into similarity-annotated vendor candidates.
pub trait VendorRetriever
where
	Self: Send + Sync,
{
	fn retrieve<'a>(
		&'a self,
		query: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<VendorCandidate>>>;
}

/// A stage that fell back to a weaker result instead of failing the search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
	ExpansionFailed,
	RetrievalPartial,
	RetrievalFailed,
	ScoringDisabled,
	ScoringBatchFailed,
	ScoringFailed,
	ScoringTimedOut,
}
impl Degradation {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::ExpansionFailed => "expansion_failed",
			Self::RetrievalPartial => "retrieval_partial",
			Self::RetrievalFailed => "retrieval_failed",
			Self::ScoringDisabled => "scoring_disabled",
			Self::ScoringBatchFailed => "scoring_batch_failed",
			Self::ScoringFailed => "scoring_failed",
			Self::ScoringTimedOut => "scoring_timed_out",
		}
	}
}

#[derive(Clone)]
pub struct Providers {
	pub llm: Arc<dyn LlmProvider>,
	pub retriever: Arc<dyn VendorRetriever>,
}
impl Providers {
	pub fn new(llm: Arc<dyn LlmProvider>, retriever: Arc<dyn VendorRetriever>) -> Self {
		Self { llm, retriever }
	}

	/// HTTP-backed language model and Postgres-backed retrieval.
	pub fn from_pool(cfg: &Config, pool: PgPool) -> Self {
		let provider = Arc::new(DefaultProviders);
		let retriever = PgVendorRetriever::new(
			pool,
			cfg.providers.embedding.clone(),
			provider.clone(),
			cfg.search.retrieval.min_similarity,
		);

		Self { llm: provider, retriever: Arc::new(retriever) }
	}
}

pub struct VendexService {
	pub cfg: Config,
	pub expander: QueryExpander,
	pub scorer: RelevanceScorer,
	pub retriever: Arc<dyn VendorRetriever>,
}
impl VendexService {
	pub fn new(cfg: Config, pool: PgPool) -> Self {
		let providers = Providers::from_pool(&cfg, pool);

		Self::with_providers(cfg, providers)
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		let llm_cfg = Arc::new(cfg.providers.llm.clone());
		let expander = QueryExpander::new(
			providers.llm.clone(),
			llm_cfg.clone(),
			cfg.search.expansion.clone(),
		);
		let scorer = RelevanceScorer::new(providers.llm, llm_cfg, cfg.search.scoring.clone());

		Self { cfg, expander, scorer, retriever: providers.retriever }
	}
}

struct DefaultProviders;
impl LlmProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: CompletionRequest<'a>,
	) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move { Ok(llm::complete(cfg, &request).await?) })
	}
}
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
