use sqlx::PgExecutor;

use crate::{Error, Result, models::VendorMatch};

pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

/// Nearest live vendors to `vector` by cosine similarity, most similar first.
pub async fn search_vendors_by_vector<'e, E>(
	executor: E,
	vector: &[f32],
	limit: u32,
	min_similarity: f32,
) -> Result<Vec<VendorMatch>>
where
	E: PgExecutor<'e>,
{
	if vector.is_empty() {
		return Err(Error::InvalidArgument("Query vector must be non-empty.".to_string()));
	}

	let rows = sqlx::query_as::<_, VendorMatch>(
		"\
WITH ranked AS (
	SELECT
		e.vendor_id,
		(1 - (e.vec <=> $1::text::vector))::float8 AS similarity
	FROM vendor_embeddings e
	JOIN vendors v ON v.vendor_id = e.vendor_id
	WHERE v.deleted_at IS NULL
	ORDER BY e.vec <=> $1::text::vector
	LIMIT $2
)
SELECT
	v.vendor_id,
	v.name,
	v.description,
	v.address,
	v.service_areas,
	COALESCE(
		(
			SELECT array_agg(c.name ORDER BY c.name)
			FROM vendor_categories vc
			JOIN categories c ON c.category_id = vc.category_id
			WHERE vc.vendor_id = v.vendor_id
		),
		ARRAY[]::text[]
	) AS categories,
	v.advertisement_expires_at,
	v.pin_until,
	v.priority_score,
	r.similarity
FROM ranked r
JOIN vendors v ON v.vendor_id = r.vendor_id
WHERE r.similarity >= $3
ORDER BY r.similarity DESC, v.vendor_id",
	)
	.bind(vector_to_pg(vector))
	.bind(i64::from(limit))
	.bind(f64::from(min_similarity))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
