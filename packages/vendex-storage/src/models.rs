use time::OffsetDateTime;
use uuid::Uuid;

/// A live vendor row joined with its category names and its cosine similarity to a query vector.
#[derive(Debug, sqlx::FromRow)]
pub struct VendorMatch {
	pub vendor_id: Uuid,
	pub name: String,
	pub description: Option<String>,
	pub address: Option<String>,
	pub service_areas: Vec<String>,
	pub categories: Vec<String>,
	pub advertisement_expires_at: Option<OffsetDateTime>,
	pub pin_until: Option<OffsetDateTime>,
	pub priority_score: Option<i32>,
	pub similarity: f64,
}
