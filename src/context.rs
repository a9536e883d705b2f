//! Explicit application context. Every operation receives this instead of
//! reaching for process-wide singletons; tests swap in mock venue and model
//! clients without touching globals.

use std::sync::Arc;

use crate::analysis::AnalysisAssembler;
use crate::collectors::{CollectorSet, CycleCache};
use crate::config::AppConfig;
use crate::domain::{default_roster, Firm};
use crate::error::Result;
use crate::models::ModelRoster;
use crate::store::Store;
use crate::venue::VenueClient;

pub struct AppContext {
    pub config: AppConfig,
    pub store: Store,
    pub venue: Arc<dyn VenueClient>,
    pub firms: Vec<Firm>,
    pub models: Arc<ModelRoster>,
    pub cache: Arc<CycleCache>,
    pub assembler: Arc<AnalysisAssembler>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        store: Store,
        venue: Arc<dyn VenueClient>,
        models: ModelRoster,
    ) -> Self {
        let firms = default_roster();
        let cache = Arc::new(CycleCache::new());
        let collectors = Arc::new(CollectorSet::from_config(&config.collectors));
        let assembler = Arc::new(AnalysisAssembler::new(collectors, cache.clone()));
        Self {
            config,
            store,
            venue,
            firms,
            models: Arc::new(models),
            cache,
            assembler,
        }
    }

    /// Production wiring: real venue REST client and provider-backed models.
    pub async fn bootstrap(config: AppConfig) -> Result<Arc<Self>> {
        config.ensure_valid()?;

        let store = Store::connect(
            &config.database.url,
            config.database.max_connections,
        )
        .await?;
        store.migrate().await?;

        let venue = Arc::new(crate::venue::VenueRestClient::new(
            &config.venue.base_url,
            &config.venue.api_key,
            std::time::Duration::from_secs(config.venue.request_timeout_secs),
        )?);

        let firms = default_roster();
        let models = ModelRoster::from_config(&firms, &config.models)?;

        Ok(Arc::new(Self::new(config, store, venue, models)))
    }
}
