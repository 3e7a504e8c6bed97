use axum::{
	Json, Router,
	extract::{Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::get,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use vendex_service::{Error as ServiceError, SearchRequest, SearchResponse};

#[derive(Debug, Deserialize)]
struct SearchParams {
	q: String,
	limit: Option<u32>,
	offset: Option<u32>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/vendors/search", get(search_query).post(search))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search_query(
	State(state): State<AppState>,
	Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
	let request = SearchRequest { query: params.q, limit: params.limit, offset: params.offset };
	let response = state.service.search(request).await?;

	Ok(Json(response))
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } => {
				let fields = invalid_field(&message).map(|field| vec![format!("$.{field}")]);

				ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, fields)
			},
			ServiceError::Provider { message } =>
				ApiError::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message, None),
			ServiceError::Storage { message } =>
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message, None),
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

/// Request fields are named by the first word of validation messages.
fn invalid_field(message: &str) -> Option<&'static str> {
	["query", "limit", "offset"].into_iter().find(|field| {
		message.split_whitespace().next() == Some(*field)
	})
}
