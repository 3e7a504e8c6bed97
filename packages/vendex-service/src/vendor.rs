use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use vendex_domain::tier::Placement;

/// A vendor returned by retrieval, annotated with its retrieval similarity.
#[derive(Clone, Debug, PartialEq)]
pub struct VendorCandidate {
	pub id: Uuid,
	pub name: String,
	pub description: Option<String>,
	pub categories: Vec<String>,
	pub address: Option<String>,
	pub service_areas: Vec<String>,
	/// Retrieval confidence in `[0, 1]`.
	pub similarity: f32,
	pub advertisement_expires_at: Option<OffsetDateTime>,
	pub pin_until: Option<OffsetDateTime>,
	pub priority_score: Option<i32>,
}
impl Placement for VendorCandidate {
	fn advertisement_expires_at(&self) -> Option<OffsetDateTime> {
		self.advertisement_expires_at
	}

	fn pin_until(&self) -> Option<OffsetDateTime> {
		self.pin_until
	}

	fn priority_score(&self) -> Option<i32> {
		self.priority_score
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suitability {
	Suitable,
	Pending,
	Unsuitable,
}
impl Suitability {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"suitable" => Some(Self::Suitable),
			"pending" => Some(Self::Pending),
			"unsuitable" => Some(Self::Unsuitable),
			_ => None,
		}
	}
}

/// A candidate that survived scoring. `relevance_score` is always within `[0, 10]` and `status` is
/// never [`Suitability::Unsuitable`].
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredVendor {
	pub candidate: VendorCandidate,
	pub relevance_score: f32,
	pub match_reason: String,
	pub status: Option<Suitability>,
}
impl Placement for ScoredVendor {
	fn advertisement_expires_at(&self) -> Option<OffsetDateTime> {
		self.candidate.advertisement_expires_at
	}

	fn pin_until(&self) -> Option<OffsetDateTime> {
		self.candidate.pin_until
	}

	fn priority_score(&self) -> Option<i32> {
		self.candidate.priority_score
	}
}
