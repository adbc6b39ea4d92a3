use crate::adapter::{AdapterFactory, AdapterRegistry};
use crate::auction::{
    AuctionBidManager, BidAuctionClient, BidRequestBuilder, RequestContextProvider, StaticContext,
};
use crate::cache::{CacheOrchestrator, OrchestratorSettings};
use crate::config::{AppConfig, PlacementConfig};
use crate::error::{MediationError, MediationResult};
use crate::metrics::Metrics;
use crate::reporting::{ErrorReporter, LogErrorReporter};
use crate::surface::{BannerAd, FullscreenAd, SurfaceEvent};
use crate::transport::{HttpTransport, HyperTransport};
use crate::types::AdType;
use crate::winloss::{FileEventStore, MemoryEventStore, PendingEventStore, WinLossNotifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Shared collaborators every placement works with
pub struct MediationServices {
    pub client: BidAuctionClient,
    pub request_builder: BidRequestBuilder,
    pub registry: AdapterRegistry,
    pub bid_manager: Arc<AuctionBidManager>,
    pub notifier: Arc<WinLossNotifier>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub metrics: Arc<Metrics>,
}

/// Wires a [`Session`]; every collaborator can be swapped before `build`
pub struct SessionBuilder {
    config: AppConfig,
    registry: AdapterRegistry,
    transport: Option<Arc<dyn HttpTransport>>,
    store: Option<Arc<dyn PendingEventStore>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    context: Option<Arc<dyn RequestContextProvider>>,
    metrics: Option<Arc<Metrics>>,
}

impl SessionBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: AdapterRegistry::new(),
            transport: None,
            store: None,
            reporter: None,
            context: None,
            metrics: None,
        }
    }

    pub fn register_adapter(
        mut self,
        name: impl Into<String>,
        factory: Arc<dyn AdapterFactory>,
    ) -> Self {
        self.registry.register(name, factory);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_event_store(mut self, store: Arc<dyn PendingEventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_context_provider(mut self, context: Arc<dyn RequestContextProvider>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> MediationResult<Session> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| MediationError::Config(format!("{:#}", e)))?;

        let metrics = self.metrics.unwrap_or_default();
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(LogErrorReporter));
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(HyperTransport::new(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )))
        });
        let store: Arc<dyn PendingEventStore> = match self.store {
            Some(store) => store,
            None => match &config.win_loss.store_path {
                Some(path) => Arc::new(FileEventStore::open(
                    path,
                    config.win_loss.max_pending_events,
                )?),
                None => Arc::new(MemoryEventStore::new(config.win_loss.max_pending_events)),
            },
        };
        let context = self
            .context
            .unwrap_or_else(|| Arc::new(StaticContext::from_config(&config.sdk)));

        let bid_manager = Arc::new(AuctionBidManager::new());
        let notifier = Arc::new(WinLossNotifier::new(
            bid_manager.clone(),
            transport.clone(),
            store,
            metrics.clone(),
            Duration::from_millis(config.win_loss.send_timeout_ms),
        ));
        notifier.set_app_key(config.sdk.app_key.clone());
        notifier.set_endpoint(config.win_loss.endpoint.clone());
        notifier.set_config(config.win_loss.payload.clone());
        notifier.set_fire_tracking_urls(config.win_loss.fire_tracking_urls);

        let services = MediationServices {
            client: BidAuctionClient::new(
                config.auction.endpoint.clone(),
                config.sdk.app_key.clone(),
                transport,
                metrics.clone(),
            ),
            request_builder: BidRequestBuilder::new(
                context,
                config.sdk.publisher_id.clone(),
                config.auction.bid_floor,
            ),
            registry: self.registry,
            bid_manager,
            notifier,
            reporter,
            metrics,
        };

        info!(
            "Session ready: {} placement(s), adapters [{}]",
            config.placements.len(),
            services.registry.names().join(", ")
        );

        Ok(Session {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }
}

/// Entry point for the host: owns the configuration snapshot and services,
/// hands out per-placement ad controllers.
pub struct Session {
    config: Arc<AppConfig>,
    services: Arc<MediationServices>,
}

impl Session {
    pub fn builder(config: AppConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Retry notifications left over from earlier runs. Returns how many
    /// were delivered.
    pub async fn start(&self) -> usize {
        let pending = self.services.notifier.pending_count();
        if pending > 0 {
            info!("Flushing {} pending win/loss notification(s)", pending);
        }
        self.services.notifier.flush_pending().await
    }

    fn placement(&self, placement_id: &str) -> MediationResult<&PlacementConfig> {
        self.config.placement(placement_id).ok_or_else(|| {
            MediationError::InvalidInput(format!("unknown placement: {}", placement_id))
        })
    }

    /// Fill loop for a placement, not yet started
    pub fn orchestrator(&self, placement_id: &str) -> MediationResult<CacheOrchestrator> {
        let placement = self.placement(placement_id)?;
        Ok(CacheOrchestrator::new(
            placement.clone(),
            OrchestratorSettings::from_config(&self.config, placement),
            self.services.clone(),
        ))
    }

    pub fn create_banner(
        &self,
        placement_id: &str,
    ) -> MediationResult<(BannerAd, mpsc::UnboundedReceiver<SurfaceEvent>)> {
        let ad_type = self.placement(placement_id)?.ad_type;
        if !matches!(ad_type, AdType::Banner | AdType::Mrec) {
            return Err(MediationError::InvalidInput(format!(
                "placement {} is {}, not a banner",
                placement_id, ad_type
            )));
        }
        Ok(BannerAd::new(
            self.orchestrator(placement_id)?,
            self.services.metrics.clone(),
        ))
    }

    /// Interstitial, rewarded or native controller
    pub fn create_fullscreen(
        &self,
        placement_id: &str,
    ) -> MediationResult<(FullscreenAd, mpsc::UnboundedReceiver<SurfaceEvent>)> {
        let ad_type = self.placement(placement_id)?.ad_type;
        if matches!(ad_type, AdType::Banner | AdType::Mrec) {
            return Err(MediationError::InvalidInput(format!(
                "placement {} is a {} placement",
                placement_id, ad_type
            )));
        }
        Ok(FullscreenAd::new(
            self.orchestrator(placement_id)?,
            self.services.metrics.clone(),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn services(&self) -> &Arc<MediationServices> {
        &self.services
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.services.metrics
    }

    pub fn notifier(&self) -> &Arc<WinLossNotifier> {
        &self.services.notifier
    }

    pub fn bid_manager(&self) -> &Arc<AuctionBidManager> {
        &self.services.bid_manager
    }
}
