//! # service-locator
//!
//! Locate and register services in a running application's service registry.
//!
//! ## Components
//!
//! - Lifecycle and lookup facade ([`locator`])
//! - Typed in-memory service registry ([`registry`])
//! - Cooperating components started on startup ([`bundle`])
//! - LDAP-style service filters ([`filter`])
//! - Service properties ([`properties`])
//! - Configuration ([`config`]) and errors ([`error`])
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use service_locator::{BundleContext, Properties, ServiceLocator, ServiceRegistry};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! let locator = ServiceLocator::default();
//! locator.start(BundleContext::new(ServiceRegistry::new())).unwrap();
//!
//! locator.register_service::<dyn Greeter>(Arc::new(English), Properties::from([("lang", "en")]));
//!
//! let greeter = locator
//!     .get_service_with_filter::<dyn Greeter>(Some("(lang=en)"))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```

pub mod bundle;
pub mod config;
pub mod error;
pub mod filter;
pub mod locator;
pub mod properties;
pub mod registry;

// Re-exports
pub use bundle::{Bundle, BundleContext, BundleError, BundleState, ComponentBundle};
pub use config::LocatorConfig;
pub use error::*;
pub use filter::{Filter, FilterError};
pub use locator::ServiceLocator;
pub use properties::Properties;
pub use registry::{RegistryError, ServiceReference, ServiceRegistration, ServiceRegistry};
