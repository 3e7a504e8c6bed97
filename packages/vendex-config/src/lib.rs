mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Providers, Search,
	SearchDynamic, SearchExpansion, SearchPage, SearchRetrieval, SearchScoring, Service, Storage,
	Vectors,
};

use std::{fs, path::Path};

pub const MAX_EXPANDED_QUERIES: u32 = 3;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vectors.dimensions {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vectors.dimensions."
				.to_string(),
		});
	}

	for (label, key) in
		[("embedding", &cfg.providers.embedding.api_key), ("llm", &cfg.providers.llm.api_key)]
	{
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, timeout_ms) in [
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.llm.timeout_ms", cfg.providers.llm.timeout_ms),
		("search.scoring.timeout_ms", cfg.search.scoring.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	let expansion = &cfg.search.expansion;

	if !matches!(expansion.mode.as_str(), "off" | "always" | "dynamic") {
		return Err(Error::Validation {
			message: "search.expansion.mode must be one of off, always, or dynamic.".to_string(),
		});
	}
	if expansion.max_queries == 0 || expansion.max_queries > MAX_EXPANDED_QUERIES {
		return Err(Error::Validation {
			message: format!(
				"search.expansion.max_queries must be in the range 1-{MAX_EXPANDED_QUERIES}."
			),
		});
	}
	if cfg.search.dynamic.min_candidates == 0 {
		return Err(Error::Validation {
			message: "search.dynamic.min_candidates must be greater than zero.".to_string(),
		});
	}

	validate_unit_interval(
		"search.dynamic.min_top_similarity",
		cfg.search.dynamic.min_top_similarity,
	)?;
	validate_unit_interval("search.retrieval.min_similarity", cfg.search.retrieval.min_similarity)?;

	for (label, temperature) in [
		("search.expansion.temperature", expansion.temperature),
		("search.scoring.temperature", cfg.search.scoring.temperature),
	] {
		if !temperature.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=2.0).contains(&temperature) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-2.0."),
			});
		}
	}
	for (label, value) in [
		("search.expansion.max_tokens", expansion.max_tokens),
		("search.scoring.max_tokens", cfg.search.scoring.max_tokens),
		("search.scoring.batch_size", cfg.search.scoring.batch_size),
		("search.scoring.max_concurrency", cfg.search.scoring.max_concurrency),
		("search.retrieval.candidate_k", cfg.search.retrieval.candidate_k),
		("search.retrieval.max_concurrency", cfg.search.retrieval.max_concurrency),
		("search.page.default_limit", cfg.search.page.default_limit),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if cfg.search.page.default_limit > cfg.search.page.max_limit {
		return Err(Error::Validation {
			message: "search.page.default_limit must not exceed search.page.max_limit."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_unit_interval(label: &str, value: f32) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{label} must be a finite number.") });
	}
	if !(0.0..=1.0).contains(&value) {
		return Err(Error::Validation { message: format!("{label} must be in the range 0.0-1.0.") });
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let mode = cfg.search.expansion.mode.trim().to_ascii_lowercase();

	cfg.search.expansion.mode = mode;

	for api_base in [&mut cfg.providers.embedding.api_base, &mut cfg.providers.llm.api_base] {
		let trimmed = api_base.trim().trim_end_matches('/').to_string();

		*api_base = trimmed;
	}
}
