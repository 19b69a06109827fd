use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::registry::ServiceRegistry;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Default,
)]
pub enum BundleState {
    #[default]
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

impl BundleState {
    /// Active, or on its way there.
    pub fn is_active_or_starting(&self) -> bool {
        matches!(self, BundleState::Active | BundleState::Starting)
    }
}

/// A cooperating component known to the [`BundleContext`].
pub trait Bundle: Send + Sync {
    fn symbolic_name(&self) -> &str;
    fn state(&self) -> BundleState;
    fn start(&self) -> BundleResult<()>;
}

type Activator = Box<dyn Fn() -> Result<(), String> + Send + Sync>;

/// In-process bundle with an optional activator run on start.
pub struct ComponentBundle {
    symbolic_name: String,
    state: RwLock<BundleState>,
    activator: Option<Activator>,
}

impl ComponentBundle {
    pub fn new(symbolic_name: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            state: RwLock::new(BundleState::Resolved),
            activator: None,
        }
    }

    pub fn with_activator<F>(mut self, activator: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.activator = Some(Box::new(activator));
        self
    }

    pub fn with_state(self, state: BundleState) -> Self {
        *self.state.write() = state;
        self
    }

    pub fn uninstall(&self) {
        *self.state.write() = BundleState::Uninstalled;
    }
}

impl Bundle for ComponentBundle {
    fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    fn state(&self) -> BundleState {
        *self.state.read()
    }

    fn start(&self) -> BundleResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                BundleState::Uninstalled => {
                    return Err(BundleError::Uninstalled {
                        name: self.symbolic_name.clone(),
                    })
                }
                BundleState::Active | BundleState::Starting => return Ok(()),
                _ => *state = BundleState::Starting,
            }
        }

        // アクティベータはロック外で実行
        let result = match &self.activator {
            Some(activator) => activator(),
            None => Ok(()),
        };

        let mut state = self.state.write();
        match result {
            Ok(()) => {
                *state = BundleState::Active;
                debug!("Bundle {} started", self.symbolic_name);
                Ok(())
            }
            Err(message) => {
                *state = BundleState::Resolved;
                Err(BundleError::StartFailed {
                    name: self.symbolic_name.clone(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for ComponentBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBundle")
            .field("symbolic_name", &self.symbolic_name)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything the locator needs from the running application: the service
/// registry and the installed bundles.
#[derive(Clone, Default)]
pub struct BundleContext {
    registry: ServiceRegistry,
    bundles: Arc<RwLock<Vec<Arc<dyn Bundle>>>>,
}

impl BundleContext {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            bundles: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn install_bundle(&self, bundle: Arc<dyn Bundle>) {
        info!("Installed bundle: {}", bundle.symbolic_name());
        self.bundles.write().push(bundle);
    }

    /// Installed bundles in installation order.
    pub fn bundles(&self) -> Vec<Arc<dyn Bundle>> {
        self.bundles.read().clone()
    }

    pub fn bundle(&self, symbolic_name: &str) -> Option<Arc<dyn Bundle>> {
        self.bundles
            .read()
            .iter()
            .find(|bundle| bundle.symbolic_name() == symbolic_name)
            .cloned()
    }
}

impl fmt::Debug for BundleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .bundles
            .read()
            .iter()
            .map(|bundle| bundle.symbolic_name().to_string())
            .collect();
        f.debug_struct("BundleContext")
            .field("registry", &self.registry)
            .field("bundles", &names)
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BundleError {
    #[error("Bundle {name} failed to start: {message}")]
    StartFailed { name: String, message: String },
    #[error("Bundle {name} is uninstalled")]
    Uninstalled { name: String },
}

pub type BundleResult<T> = Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use std::{
        str::FromStr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[test]
    fn test_start_runs_activator_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let bundle = ComponentBundle::new("org.example.ds").with_activator(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bundle.state(), BundleState::Resolved);
        bundle.start().unwrap();
        assert_eq!(bundle.state(), BundleState::Active);

        // 起動済みなら何もしない
        bundle.start().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_start_returns_to_resolved() {
        let bundle =
            ComponentBundle::new("org.example.broken").with_activator(|| Err("boom".to_string()));
        let err = bundle.start().unwrap_err();
        assert_eq!(
            err,
            BundleError::StartFailed {
                name: "org.example.broken".to_string(),
                message: "boom".to_string(),
            }
        );
        assert_eq!(bundle.state(), BundleState::Resolved);
    }

    #[test]
    fn test_uninstalled_bundle_cannot_start() {
        let bundle = ComponentBundle::new("org.example.gone");
        bundle.uninstall();
        assert!(matches!(
            bundle.start(),
            Err(BundleError::Uninstalled { .. })
        ));
    }

    #[test]
    fn test_state_display_and_parse() {
        assert_eq!(BundleState::Starting.to_string(), "Starting");
        assert_eq!(BundleState::from_str("Active").unwrap(), BundleState::Active);
        assert!(BundleState::Starting.is_active_or_starting());
        assert!(!BundleState::Stopping.is_active_or_starting());
    }

    #[test]
    fn test_context_bundles() {
        let context = BundleContext::new(ServiceRegistry::new());
        context.install_bundle(Arc::new(ComponentBundle::new("a")));
        context.install_bundle(Arc::new(ComponentBundle::new("b")));

        let names: Vec<String> = context
            .bundles()
            .iter()
            .map(|b| b.symbolic_name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(context.bundle("b").is_some());
        assert!(context.bundle("c").is_none());
    }
}
