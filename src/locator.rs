use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use crate::{
    bundle::BundleContext,
    config::LocatorConfig,
    filter::Filter,
    properties::Properties,
    registry::{ServiceReference, ServiceRegistration},
    LocatorResult,
};

/// Looks up and registers services through the running [`BundleContext`].
///
/// The locator is RUNNING between [`ServiceLocator::start`] and
/// [`ServiceLocator::stop`]. Outside that window every lookup returns an
/// empty result and registration returns `None`.
pub struct ServiceLocator {
    context: ArcSwapOption<BundleContext>,
    config: LocatorConfig,
}

impl Default for ServiceLocator {
    fn default() -> Self {
        Self::new(LocatorConfig::default())
    }
}

impl ServiceLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            context: ArcSwapOption::empty(),
            config,
        }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Publish `context` and start the configured cooperating bundles.
    ///
    /// A bundle that fails to start aborts startup with an invalid-argument
    /// error, unless `fail_on_activation_error` is off. On abort the
    /// previously published context, if any, is restored.
    #[tracing::instrument(skip(self, context), level = "debug")]
    pub fn start(&self, context: BundleContext) -> LocatorResult<()> {
        let context = Arc::new(context);
        let previous = self.context.swap(Some(context.clone()));

        for bundle in context.bundles() {
            let name = bundle.symbolic_name().to_string();
            if !self.config.should_auto_start(&name) {
                continue;
            }
            let state = bundle.state();
            if state.is_active_or_starting() {
                debug!("Bundle {} already {}", name, state);
                continue;
            }

            info!("Starting bundle: {}", name);
            if let Err(e) = bundle.start() {
                if self.config.fail_on_activation_error {
                    self.context.store(previous);
                    return Err(e.into());
                }
                warn!("Bundle {} failed to start, continuing: {}", name, e);
            }
        }

        info!("ServiceLocator started");
        Ok(())
    }

    pub fn stop(&self) {
        self.context.store(None);
        info!("ServiceLocator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.context.load().is_some()
    }

    /// The published context, if running.
    pub fn context(&self) -> Option<Arc<BundleContext>> {
        self.context.load_full()
    }

    /// The default service of type `S`, or `None` when there is none or the
    /// locator is not running.
    pub fn get_service<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.context()?.registry().service::<S>()
    }

    /// First service of type `S` matching `filter`.
    pub fn get_service_with_filter<S>(&self, filter: Option<&str>) -> LocatorResult<Option<Arc<S>>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Ok(self.get_services::<S>(filter)?.into_iter().next())
    }

    /// All services of type `S` matching `filter`, in registration order.
    ///
    /// Returns an empty list when not running. A malformed filter is an
    /// invalid-argument error.
    pub fn get_services<S>(&self, filter: Option<&str>) -> LocatorResult<Vec<Arc<S>>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let Some(context) = self.context() else {
            return Ok(Vec::new());
        };
        let filter = parse_optional_filter(filter)?;
        Ok(context.registry().services::<S>(filter.as_ref()))
    }

    /// Services of type `S` matching an already-built [`Filter`].
    pub fn find_services<S>(&self, filter: &Filter) -> Vec<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.context()
            .map(|context| context.registry().services::<S>(Some(filter)))
            .unwrap_or_default()
    }

    pub fn get_service_references<S>(
        &self,
        filter: Option<&str>,
    ) -> LocatorResult<Vec<ServiceReference>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let Some(context) = self.context() else {
            return Ok(Vec::new());
        };
        let filter = parse_optional_filter(filter)?;
        Ok(context.registry().references::<S>(filter.as_ref()))
    }

    /// Register `service` under type `S`. `None` when not running.
    pub fn register_service<S>(
        &self,
        service: Arc<S>,
        properties: Properties,
    ) -> Option<ServiceRegistration<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let context = self.context()?;
        Some(context.registry().register::<S>(service, properties))
    }
}

// None のみ「フィルタなし」、空文字列は構文エラー
fn parse_optional_filter(filter: Option<&str>) -> LocatorResult<Option<Filter>> {
    filter.map(Filter::parse).transpose().map_err(Into::into)
}
