use std::{
    any::{type_name, Any, TypeId},
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::{
    filter::Filter,
    properties::{Properties, OBJECT_CLASS, SERVICE_ID},
};

type ServiceTable = DashMap<TypeId, Vec<Arc<ServiceEntry>>>;

/// Registered service. Immutable once inserted.
struct ServiceEntry {
    reference: ServiceReference,
    ranking: i32,
    // always an `Arc<S>` for the `S` the entry is keyed under
    instance: Box<dyn Any + Send + Sync>,
}

impl ServiceEntry {
    fn instance<S: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.instance.downcast_ref::<Arc<S>>().cloned()
    }
}

/// Metadata of a registered service: its id, declared type and a snapshot of
/// its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReference {
    id: u64,
    type_name: &'static str,
    properties: Properties,
}

impl ServiceReference {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }
}

/// In-memory service registry keyed by declared service type.
///
/// Entries of one type are kept in registration order. Clones share the same
/// underlying table.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<ServiceTable>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("types", &self.services.len())
            .field("services", &self.len())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under the declared type `S`.
    ///
    /// `service.id` and `objectClass` are assigned by the registry and
    /// override caller-supplied values.
    pub fn register<S>(&self, instance: Arc<S>, properties: Properties) -> ServiceRegistration<S>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let mut properties = properties;
        properties.insert(OBJECT_CLASS, type_name::<S>());
        let ranking = properties.ranking();

        // id は型ごとのロック内で採番し、登録順 = id順 を保証する
        let mut slot = self.services.entry(TypeId::of::<S>()).or_default();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        properties.insert(SERVICE_ID, id.to_string());

        let reference = ServiceReference {
            id,
            type_name: type_name::<S>(),
            properties,
        };
        slot.push(Arc::new(ServiceEntry {
            reference: reference.clone(),
            ranking,
            instance: Box::new(instance),
        }));
        drop(slot);

        debug!("Registered service {} ({})", id, type_name::<S>());

        ServiceRegistration {
            reference,
            services: Arc::downgrade(&self.services),
            _service: PhantomData,
        }
    }

    /// Remove a registration by service id.
    pub fn unregister(&self, id: u64) -> RegistryResult<()> {
        remove_entry(&self.services, id)
    }

    /// The default service of type `S`: highest `service.ranking`, then the
    /// lowest `service.id`.
    pub fn service<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let entries = self.entries::<S>(None);
        entries
            .iter()
            .reduce(|best, entry| {
                if entry.ranking > best.ranking {
                    entry
                } else {
                    best
                }
            })
            .and_then(|entry| entry.instance::<S>())
    }

    /// All services of type `S` matching `filter`, in registration order.
    pub fn services<S>(&self, filter: Option<&Filter>) -> Vec<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.entries::<S>(filter)
            .iter()
            .filter_map(|entry| entry.instance::<S>())
            .collect()
    }

    /// References of all services of type `S` matching `filter`, in
    /// registration order.
    pub fn references<S>(&self, filter: Option<&Filter>) -> Vec<ServiceReference>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.entries::<S>(filter)
            .iter()
            .map(|entry| entry.reference.clone())
            .collect()
    }

    /// Resolve a reference obtained from [`ServiceRegistry::references`].
    /// `None` once the service has been unregistered.
    pub fn resolve<S>(&self, reference: &ServiceReference) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.services.get(&TypeId::of::<S>()).and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.reference.id == reference.id)
                .and_then(|entry| entry.instance::<S>())
        })
    }

    pub fn count<S>(&self) -> usize
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.services
            .get(&TypeId::of::<S>())
            .map_or(0, |entries| entries.len())
    }

    pub fn len(&self) -> usize {
        self.services.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // シャードのロックは Arc を複製した時点で解放する
    fn entries<S>(&self, filter: Option<&Filter>) -> Vec<Arc<ServiceEntry>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.services
            .get(&TypeId::of::<S>())
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        filter.map_or(true, |filter| filter.matches(&entry.reference.properties))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn remove_entry(services: &ServiceTable, id: u64) -> RegistryResult<()> {
    let mut removed = None;
    for mut entries in services.iter_mut() {
        if let Some(index) = entries.iter().position(|entry| entry.reference.id == id) {
            removed = Some(entries.remove(index));
            break;
        }
    }
    match removed {
        Some(entry) => {
            debug!("Unregistered service {} ({})", id, entry.reference.type_name);
            Ok(())
        }
        None => Err(RegistryError::NotRegistered { id }),
    }
}

/// Handle returned by registration, used to unregister the service later.
///
/// Dropping the handle leaves the service registered.
pub struct ServiceRegistration<S: ?Sized> {
    reference: ServiceReference,
    services: Weak<ServiceTable>,
    _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized> ServiceRegistration<S> {
    pub fn id(&self) -> u64 {
        self.reference.id
    }

    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }

    pub fn unregister(self) -> RegistryResult<()> {
        let services = self
            .services
            .upgrade()
            .ok_or(RegistryError::RegistryClosed {
                id: self.reference.id,
            })?;
        remove_entry(&services, self.reference.id)
    }
}

impl<S: ?Sized> fmt::Debug for ServiceRegistration<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("reference", &self.reference)
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Service {id} is not registered")]
    NotRegistered { id: u64 },
    #[error("Registry of service {id} has been dropped")]
    RegistryClosed { id: u64 },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::SERVICE_RANKING;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct French;
    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = ServiceRegistry::new();
        assert!(registry.service::<dyn Greeter>().is_none());
        assert!(registry.services::<dyn Greeter>(None).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_trait_object() {
        let registry = ServiceRegistry::new();
        let registration =
            registry.register::<dyn Greeter>(Arc::new(English), Properties::new().with("lang", "en"));

        assert_eq!(registration.id(), 1);
        let reference = registration.reference();
        assert_eq!(reference.property(SERVICE_ID), Some("1"));
        assert_eq!(reference.property("objectclass"), Some(type_name::<dyn Greeter>()));
        assert_eq!(reference.property("lang"), Some("en"));

        let greeter = registry.service::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert_eq!(registry.count::<dyn Greeter>(), 1);
        // 別の型としては見えない
        assert!(registry.service::<English>().is_none());
    }

    #[test]
    fn test_framework_properties_override_caller() {
        let registry = ServiceRegistry::new();
        let registration = registry.register::<u32>(
            Arc::new(7),
            Properties::new().with(SERVICE_ID, "99").with(OBJECT_CLASS, "bogus"),
        );
        assert_eq!(registration.reference().property(SERVICE_ID), Some("1"));
        assert_eq!(registration.reference().property(OBJECT_CLASS), Some("u32"));
    }

    #[test]
    fn test_registration_order_and_filter() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Greeter>(Arc::new(English), Properties::from([("lang", "en")]));
        registry.register::<dyn Greeter>(Arc::new(French), Properties::from([("lang", "fr")]));

        let all: Vec<String> = registry
            .services::<dyn Greeter>(None)
            .iter()
            .map(|g| g.greet())
            .collect();
        assert_eq!(all, vec!["hello", "bonjour"]);

        let filter = Filter::equal("lang", "fr");
        let french = registry.services::<dyn Greeter>(Some(&filter));
        assert_eq!(french.len(), 1);
        assert_eq!(french[0].greet(), "bonjour");

        let ids: Vec<u64> = registry
            .references::<dyn Greeter>(None)
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_default_service_uses_ranking() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Greeter>(Arc::new(English), Properties::new());
        assert_eq!(registry.service::<dyn Greeter>().unwrap().greet(), "hello");

        registry.register::<dyn Greeter>(
            Arc::new(French),
            Properties::from([(SERVICE_RANKING, "5")]),
        );
        assert_eq!(registry.service::<dyn Greeter>().unwrap().greet(), "bonjour");
        // services() は登録順のまま
        assert_eq!(registry.services::<dyn Greeter>(None)[0].greet(), "hello");
    }

    #[test]
    fn test_unregister() {
        let registry = ServiceRegistry::new();
        let first = registry.register::<u32>(Arc::new(1), Properties::new());
        let second = registry.register::<u32>(Arc::new(2), Properties::new());
        let second_id = second.id();
        let reference = first.reference().clone();

        assert_eq!(registry.resolve::<u32>(&reference).as_deref(), Some(&1));
        first.unregister().unwrap();
        assert!(registry.resolve::<u32>(&reference).is_none());
        assert_eq!(registry.services::<u32>(None).len(), 1);

        registry.unregister(second_id).unwrap();
        assert_eq!(
            registry.unregister(second_id),
            Err(RegistryError::NotRegistered { id: second_id })
        );
        assert!(registry.is_empty());
        let _ = second;
    }

    #[test]
    fn test_unregister_after_registry_dropped() {
        let registry = ServiceRegistry::new();
        let registration = registry.register::<u32>(Arc::new(1), Properties::new());
        drop(registry);
        assert_eq!(
            registration.unregister(),
            Err(RegistryError::RegistryClosed { id: 1 })
        );
    }

    #[test]
    fn test_concurrent_registration_keeps_order() {
        let registry = ServiceRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        registry.register::<u64>(Arc::new(i * 100 + j), Properties::new());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids: Vec<u64> = registry
            .references::<u64>(None)
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids.len(), 400);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
