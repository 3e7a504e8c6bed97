use std::sync::Arc;

use vendex_service::VendexService;
use vendex_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<VendexService>,
}
impl AppState {
	/// Connects Postgres, bootstraps the schema, and wires the default providers.
	pub async fn new(config: vendex_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.vectors.dimensions).await?;

		let service = VendexService::new(config, db.pool);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: VendexService) -> Self {
		Self { service: Arc::new(service) }
	}
}
