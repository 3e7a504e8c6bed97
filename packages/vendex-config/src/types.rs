use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub vectors: Vectors,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Vectors {
	pub dimensions: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Chat-completion endpoint used for query expansion and relevance scoring.
///
/// Sampling parameters live on the calling stage (`search.expansion`, `search.scoring`), not here.
#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Search {
	pub expansion: SearchExpansion,
	#[serde(default)]
	pub dynamic: SearchDynamic,
	pub retrieval: SearchRetrieval,
	pub scoring: SearchScoring,
	#[serde(default)]
	pub page: SearchPage,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchExpansion {
	/// One of "off", "always", or "dynamic".
	pub mode: String,
	pub max_queries: u32,
	#[serde(default)]
	pub include_original: bool,
	#[serde(default = "default_expansion_max_tokens")]
	pub max_tokens: u32,
	#[serde(default = "default_expansion_temperature")]
	pub temperature: f32,
}

/// Thresholds for `search.expansion.mode = "dynamic"`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SearchDynamic {
	pub min_candidates: u32,
	pub min_top_similarity: f32,
}
impl Default for SearchDynamic {
	fn default() -> Self {
		Self { min_candidates: 5, min_top_similarity: 0.45 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchRetrieval {
	pub candidate_k: u32,
	#[serde(default)]
	pub min_similarity: f32,
	#[serde(default = "default_max_concurrency")]
	pub max_concurrency: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchScoring {
	pub enabled: bool,
	#[serde(default = "default_scoring_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_max_concurrency")]
	pub max_concurrency: u32,
	#[serde(default = "default_scoring_max_tokens")]
	pub max_tokens: u32,
	#[serde(default = "default_scoring_temperature")]
	pub temperature: f32,
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SearchPage {
	pub default_limit: u32,
	pub max_limit: u32,
}
impl Default for SearchPage {
	fn default() -> Self {
		Self { default_limit: 20, max_limit: 100 }
	}
}

fn default_expansion_max_tokens() -> u32 {
	200
}

fn default_expansion_temperature() -> f32 {
	0.3
}

fn default_max_concurrency() -> u32 {
	3
}

fn default_scoring_batch_size() -> u32 {
	10
}

fn default_scoring_max_tokens() -> u32 {
	2_000
}

fn default_scoring_temperature() -> f32 {
	0.1
}
