//! Disposable vendor databases for Postgres-backed tests.
//!
//! Tests call [`env_dsn`] and skip when `VENDEX_PG_DSN` is unset. A [`TestDatabase`] lives next to
//! the database named by that DSN and is dropped on [`TestDatabase::cleanup`] or, failing that,
//! when the value is dropped.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor, PgPool,
	postgres::{PgConnectOptions, PgConnection},
};
use time::OffsetDateTime;
use tokio::runtime::Builder;
use uuid::Uuid;

use vendex_config::Postgres;
use vendex_storage::{db::Db, queries};

pub const DSN_ENV: &str = "VENDEX_PG_DSN";

pub fn env_dsn() -> Option<String> {
	env::var(DSN_ENV).ok()
}

pub struct TestDatabase {
	name: String,
	dsn: String,
	server: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	/// Creates an empty database on the server addressed by `base_dsn`.
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let server = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse {DSN_ENV}: {err}.")))?;
		let name = format!("vendex_test_{}", Uuid::new_v4().simple());
		let mut conn = PgConnection::connect_with(&server).await?;

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;
		conn.close().await?;

		let dsn = server.clone().database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, server, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn postgres_config(&self) -> Postgres {
		Postgres { dsn: self.dsn.clone(), pool_max_conns: 2 }
	}

	/// Connects and bootstraps the vendor schema with `vector_dim`-wide embeddings.
	pub async fn vendor_db(&self, vector_dim: u32) -> Result<Db> {
		let db = Db::connect(&self.postgres_config()).await?;

		db.ensure_schema(vector_dim).await?;

		Ok(db)
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.server, &self.name).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let server = self.server.clone();
		let name = self.name.clone();
		// The caller's runtime may already be shutting down, so cleanup gets its own.
		let handle = thread::spawn(move || {
			let outcome = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(err.to_string()))
				.and_then(|runtime| runtime.block_on(drop_database(&server, &name)));

			if let Err(err) = outcome {
				eprintln!("Failed to drop test database {name}: {err}.");
			}
		});
		let _ = handle.join();
	}
}

/// A vendor row plus its embedding. Placement fields default to inactive.
#[derive(Clone, Debug)]
pub struct VendorSeed<'a> {
	pub name: &'a str,
	pub vector: &'a [f32],
	pub address: Option<&'a str>,
	pub service_areas: Vec<String>,
	pub advertisement_expires_at: Option<OffsetDateTime>,
	pub pin_until: Option<OffsetDateTime>,
	pub priority_score: Option<i32>,
	pub deleted: bool,
}
impl<'a> VendorSeed<'a> {
	pub fn new(name: &'a str, vector: &'a [f32]) -> Self {
		Self {
			name,
			vector,
			address: None,
			service_areas: Vec::new(),
			advertisement_expires_at: None,
			pin_until: None,
			priority_score: None,
			deleted: false,
		}
	}
}

pub async fn insert_vendor(pool: &PgPool, seed: &VendorSeed<'_>) -> Result<Uuid> {
	let vendor_id = Uuid::new_v4();
	let deleted_at = seed.deleted.then(OffsetDateTime::now_utc);
	let mut tx = pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO vendors (
	vendor_id,
	name,
	description,
	address,
	service_areas,
	advertisement_expires_at,
	pin_until,
	priority_score,
	deleted_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
	)
	.bind(vendor_id)
	.bind(seed.name)
	.bind(format!("{} description", seed.name))
	.bind(seed.address)
	.bind(&seed.service_areas)
	.bind(seed.advertisement_expires_at)
	.bind(seed.pin_until)
	.bind(seed.priority_score)
	.bind(deleted_at)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"\
INSERT INTO vendor_embeddings (vendor_id, embedding_version, embedding_dim, vec)
VALUES ($1, 'test', $2, $3::text::vector)",
	)
	.bind(vendor_id)
	.bind(seed.vector.len() as i32)
	.bind(queries::vector_to_pg(seed.vector))
	.execute(&mut *tx)
	.await?;
	tx.commit().await?;

	Ok(vendor_id)
}

/// Links a vendor to a category, creating the category on first use.
pub async fn tag_vendor(pool: &PgPool, vendor_id: Uuid, category: &str) -> Result<()> {
	sqlx::query(
		"\
WITH category AS (
	INSERT INTO categories (category_id, name)
	VALUES ($2, $3)
	ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
	RETURNING category_id
)
INSERT INTO vendor_categories (vendor_id, category_id)
SELECT $1, category_id FROM category",
	)
	.bind(vendor_id)
	.bind(Uuid::new_v4())
	.bind(category)
	.execute(pool)
	.await?;

	Ok(())
}

async fn drop_database(server: &PgConnectOptions, name: &str) -> Result<()> {
	let mut conn = PgConnection::connect_with(server).await?;

	sqlx::query(
		"SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.execute(&mut conn)
	.await?;
	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str()).await?;
	conn.close().await?;

	Ok(())
}
