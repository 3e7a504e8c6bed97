use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tower::util::ServiceExt;
use uuid::Uuid;

use vendex_api::{routes, state::AppState};
use vendex_config::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Providers as ProviderConfigs,
	Search, SearchDynamic, SearchExpansion, SearchPage, SearchRetrieval, SearchScoring, Service,
	Storage, Vectors,
};
use vendex_service::{
	BoxFuture, CompletionRequest, EmbeddingProvider, Error, LlmProvider, PgVendorRetriever,
	Providers, Result, VendexService, VendorCandidate, VendorRetriever,
};
use vendex_testkit::{TestDatabase, VendorSeed};

struct DownLlm;
impl LlmProvider for DownLlm {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_request: CompletionRequest<'a>,
	) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move { Err(Error::Provider { message: "connection refused".to_string() }) })
	}
}

/// Embeds every text as the first unit axis.
struct AxisEmbedding;
impl EmbeddingProvider for AxisEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let mut axis = vec![0.0; cfg.dimensions as usize];

		axis[0] = 1.0;

		Box::pin(async move { Ok(vec![axis; texts.len()]) })
	}
}

struct FixedRetriever {
	candidates: Vec<VendorCandidate>,
}
impl VendorRetriever for FixedRetriever {
	fn retrieve<'a>(
		&'a self,
		_query: &'a str,
		_limit: u32,
	) -> BoxFuture<'a, Result<Vec<VendorCandidate>>> {
		Box::pin(async move { Ok(self.candidates.clone()) })
	}
}

fn test_config(dsn: String) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			postgres: Postgres { dsn, pool_max_conns: 1 },
			vectors: Vectors { dimensions: 4 },
		},
		providers: ProviderConfigs {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				model: "test".to_string(),
				dimensions: 4,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			llm: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				model: "test".to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		search: Search {
			expansion: SearchExpansion {
				mode: "always".to_string(),
				max_queries: 3,
				include_original: false,
				max_tokens: 200,
				temperature: 0.3,
			},
			dynamic: SearchDynamic::default(),
			retrieval: SearchRetrieval { candidate_k: 30, min_similarity: 0.0, max_concurrency: 3 },
			scoring: SearchScoring {
				enabled: true,
				batch_size: 10,
				max_concurrency: 3,
				max_tokens: 2_000,
				temperature: 0.1,
				timeout_ms: 5_000,
			},
			page: SearchPage::default(),
		},
	}
}

fn vendor(name: &str, similarity: f32) -> VendorCandidate {
	VendorCandidate {
		id: Uuid::new_v4(),
		name: name.to_string(),
		description: None,
		categories: vec!["피부과".to_string()],
		address: Some("서울 강남구".to_string()),
		service_areas: Vec::new(),
		similarity,
		advertisement_expires_at: None,
		pin_until: None,
		priority_score: None,
	}
}

fn stub_router(candidates: Vec<VendorCandidate>) -> Router {
	let providers = Providers::new(Arc::new(DownLlm), Arc::new(FixedRetriever { candidates }));
	let cfg = test_config("postgres://unused".to_string());
	let service = VendexService::with_providers(cfg, providers);

	routes::router(AppState::from_service(service))
}

async fn read_json(response: axum::response::Response) -> Value {
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");

	serde_json::from_slice(&body).expect("Failed to parse response.")
}

#[tokio::test]
async fn health_ok() {
	let app = stub_router(Vec::new());
	let response = app
		.oneshot(
			Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn search_survives_model_outage() {
	let now = OffsetDateTime::now_utc();
	let mut advertised = vendor("광고 피부과", 0.4);
	let mut boosted = vendor("우선 피부과", 0.9);

	advertised.advertisement_expires_at = Some(now + time::Duration::days(7));
	boosted.priority_score = Some(100);

	let app = stub_router(vec![boosted.clone(), advertised.clone()]);
	let payload = serde_json::json!({ "query": "강남 피부과 추천" });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/vendors/search")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call search.");

	assert_eq!(response.status(), StatusCode::OK);

	let json = read_json(response).await;

	assert_eq!(json["query"], "강남 피부과 추천");
	assert_eq!(json["expanded_queries"], serde_json::json!(["강남 피부과 추천"]));
	assert_eq!(json["total"], 2);
	assert_eq!(json["items"][0]["vendor_id"], advertised.id.to_string());
	assert_eq!(json["items"][0]["tier"], "advertised");
	assert_eq!(json["items"][0]["is_advertised"], true);
	assert_eq!(json["items"][1]["priority_score"], 100);
	assert_eq!(json["items"][1]["match_reason"], "similarity-based fallback");
	assert_eq!(json["degraded"], serde_json::json!(["expansion_failed", "scoring_failed"]));
}

#[tokio::test]
async fn get_search_applies_pagination() {
	let candidates: Vec<VendorCandidate> =
		(0..3).map(|idx| vendor(&format!("clinic-{idx}"), 0.9 - idx as f32 * 0.2)).collect();
	let app = stub_router(candidates.clone());
	let response = app
		.oneshot(
			Request::builder()
				.uri("/v1/vendors/search?q=%EB%B3%B4%ED%86%A1%EC%8A%A4&limit=1&offset=1")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call search.");

	assert_eq!(response.status(), StatusCode::OK);

	let json = read_json(response).await;

	assert_eq!(json["query"], "보톡스");
	assert_eq!(json["total"], 3);
	assert_eq!(json["items"].as_array().map(Vec::len), Some(1));
	assert_eq!(json["items"][0]["vendor_id"], candidates[1].id.to_string());
}

#[tokio::test]
async fn blank_query_is_rejected() {
	let app = stub_router(Vec::new());
	let payload = serde_json::json!({ "query": "  " });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/vendors/search")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call search.");

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let json = read_json(response).await;

	assert_eq!(json["error_code"], "INVALID_REQUEST");
	assert_eq!(json["fields"][0], "$.query");
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set VENDEX_PG_DSN to run."]
async fn postgres_backed_search_tiers_seeded_vendors() {
	let Some(base_dsn) = vendex_testkit::env_dsn() else {
		eprintln!("Skipping HTTP tests; set VENDEX_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let config = test_config(test_db.dsn().to_string());
	let state = AppState::new(config.clone()).await.expect("Failed to initialize app state.");
	let response = routes::router(state)
		.oneshot(
			Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);

	let db = test_db.vendor_db(4).await.expect("Failed to bootstrap schema.");
	let boosted = vendex_testkit::insert_vendor(
		&db.pool,
		&VendorSeed {
			priority_score: Some(100),
			..VendorSeed::new("우선 피부과", &[1.0, 0.0, 0.0, 0.0])
		},
	)
	.await
	.expect("Failed to seed vendor.");
	let advertised = vendex_testkit::insert_vendor(
		&db.pool,
		&VendorSeed {
			advertisement_expires_at: Some(OffsetDateTime::now_utc() + time::Duration::days(7)),
			..VendorSeed::new("광고 피부과", &[0.6, 0.8, 0.0, 0.0])
		},
	)
	.await
	.expect("Failed to seed vendor.");

	vendex_testkit::tag_vendor(&db.pool, advertised, "피부과").await.expect("Failed to tag vendor.");

	let retriever = PgVendorRetriever::new(
		db.pool.clone(),
		config.providers.embedding.clone(),
		Arc::new(AxisEmbedding),
		0.1,
	);
	let providers = Providers::new(Arc::new(DownLlm), Arc::new(retriever));
	let service = VendexService::with_providers(config, providers);
	let response = routes::router(AppState::from_service(service))
		.oneshot(
			Request::builder()
				.uri("/v1/vendors/search?q=%ED%94%BC%EB%B6%80%EA%B3%BC")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call search.");

	assert_eq!(response.status(), StatusCode::OK);

	let json = read_json(response).await;

	assert_eq!(json["total"], 2);
	assert_eq!(json["items"][0]["vendor_id"], advertised.to_string());
	assert_eq!(json["items"][0]["categories"], serde_json::json!(["피부과"]));
	assert_eq!(json["items"][1]["vendor_id"], boosted.to_string());
	assert_eq!(json["items"][1]["priority_score"], 100);

	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
