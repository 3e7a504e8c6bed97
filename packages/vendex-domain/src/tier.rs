//! Placement tiers for search results.
//!
//! Paid placement always outranks organic relevance: advertised vendors come first, then pinned
//! vendors, then everyone else. Within a tier, higher `priority_score` wins and equal priorities
//! keep their input order.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
	Advertised,
	Pinned,
	Regular,
}
impl Tier {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Advertised => "advertised",
			Self::Pinned => "pinned",
			Self::Regular => "regular",
		}
	}

	fn rank(self) -> u8 {
		match self {
			Self::Advertised => 0,
			Self::Pinned => 1,
			Self::Regular => 2,
		}
	}
}

/// Placement fields read from the vendor record.
pub trait Placement {
	fn advertisement_expires_at(&self) -> Option<OffsetDateTime>;

	fn pin_until(&self) -> Option<OffsetDateTime>;

	fn priority_score(&self) -> Option<i32>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tiered<T> {
	pub vendor: T,
	pub tier: Tier,
	pub is_advertised: bool,
	pub is_pinned: bool,
	pub priority_score: i32,
}
impl<T> Placement for Tiered<T>
where
	T: Placement,
{
	fn advertisement_expires_at(&self) -> Option<OffsetDateTime> {
		self.vendor.advertisement_expires_at()
	}

	fn pin_until(&self) -> Option<OffsetDateTime> {
		self.vendor.pin_until()
	}

	fn priority_score(&self) -> Option<i32> {
		self.vendor.priority_score()
	}
}

pub fn classify<P>(vendor: &P, now: OffsetDateTime) -> Tier
where
	P: Placement + ?Sized,
{
	if vendor.advertisement_expires_at().is_some_and(|expires_at| expires_at > now) {
		return Tier::Advertised;
	}
	if vendor.pin_until().is_some_and(|pin_until| pin_until > now) {
		return Tier::Pinned;
	}

	Tier::Regular
}

pub fn classify_and_sort<T>(vendors: Vec<T>, now: OffsetDateTime) -> Vec<Tiered<T>>
where
	T: Placement,
{
	let mut tiered: Vec<Tiered<T>> = vendors
		.into_iter()
		.map(|vendor| {
			let tier = classify(&vendor, now);
			let priority_score = vendor.priority_score().unwrap_or(0);

			Tiered {
				vendor,
				tier,
				is_advertised: tier == Tier::Advertised,
				is_pinned: tier == Tier::Pinned,
				priority_score,
			}
		})
		.collect();

	// `sort_by` is stable, so equal keys keep their input order.
	tiered.sort_by(|a, b| {
		a.tier.rank().cmp(&b.tier.rank()).then_with(|| b.priority_score.cmp(&a.priority_score))
	});

	tiered
}
