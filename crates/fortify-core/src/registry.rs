//! Named-instance store for one kind of resilience primitive.
//!
//! A [`Registry`] hands out `Arc`s to lazily created instances. Looking up
//! the same name returns the same instance until it is explicitly removed or
//! replaced. Lookups only take a read lock; additions, removals and
//! replacements are serialized against each other and against the delivery
//! of their [`RegistryEvent`]s, which subscribers receive synchronously and in
//! subscription order.
//!
//! ```
//! use fortify_core::{Registrable, Registry};
//! use std::sync::Arc;
//!
//! struct Counter {
//!     name: String,
//!     start: u64,
//! }
//!
//! impl Registrable for Counter {
//!     type Config = u64;
//!     const KIND: &'static str = "counter";
//!
//!     fn create(name: &str, config: &u64) -> Self {
//!         Counter { name: name.to_string(), start: *config }
//!     }
//!
//!     fn name(&self) -> &str {
//!         &self.name
//!     }
//! }
//!
//! let registry = Registry::<Counter>::new(0);
//! registry.add_configuration("warm", 10);
//!
//! let a = registry.get_or_create("warm");
//! let b = registry.get_or_create("warm");
//! assert!(Arc::ptr_eq(&a, &b));
//! assert_eq!(a.start, 10);
//! assert_eq!(registry.get_or_create("cold").start, 0);
//! ```

use crate::events::{EventPublisher, ResilienceEvent};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::gauge;

#[cfg(feature = "tracing")]
use tracing::info;

/// A primitive that can be stored in a [`Registry`].
pub trait Registrable: Send + Sync + Sized + 'static {
    /// Configuration the instance is built from.
    type Config: Clone + Send + Sync + 'static;

    /// Short name of the primitive kind, used in logs and metric labels.
    const KIND: &'static str;

    /// Builds a fresh instance.
    fn create(name: &str, config: &Self::Config) -> Self;

    /// The name the instance was created with.
    fn name(&self) -> &str;

    /// Releases resources held by the instance, e.g. worker threads.
    ///
    /// Called when the instance leaves the registry through `remove`,
    /// `replace` or `clear`. The default does nothing.
    fn shutdown(&self) {}
}

/// Lifecycle change of a registry entry.
pub enum RegistryEvent<T> {
    /// A new instance was created and stored.
    Added {
        /// The new instance
        entry: Arc<T>,
        /// When the change happened
        timestamp: Instant,
    },
    /// An instance was removed.
    Removed {
        /// The removed instance
        entry: Arc<T>,
        /// When the change happened
        timestamp: Instant,
    },
    /// An instance was swapped for a freshly configured one.
    Replaced {
        /// The previous instance
        old: Arc<T>,
        /// The instance now stored under the name
        new: Arc<T>,
        /// When the change happened
        timestamp: Instant,
    },
}

impl<T: Registrable> RegistryEvent<T> {
    /// The instance now associated with the event's name, or the removed one.
    pub fn entry(&self) -> &Arc<T> {
        match self {
            RegistryEvent::Added { entry, .. } | RegistryEvent::Removed { entry, .. } => entry,
            RegistryEvent::Replaced { new, .. } => new,
        }
    }
}

impl<T: Registrable> fmt::Debug for RegistryEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEvent")
            .field("kind", &T::KIND)
            .field("event", &self.event_type())
            .field("name", &self.pattern_name())
            .finish()
    }
}

impl<T: Registrable> ResilienceEvent for RegistryEvent<T> {
    fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::Added { .. } => "entry_added",
            RegistryEvent::Removed { .. } => "entry_removed",
            RegistryEvent::Replaced { .. } => "entry_replaced",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RegistryEvent::Added { timestamp, .. }
            | RegistryEvent::Removed { timestamp, .. }
            | RegistryEvent::Replaced { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        self.entry().name()
    }
}

/// Named instances of one primitive kind.
pub struct Registry<T: Registrable> {
    entries: RwLock<HashMap<String, Arc<T>>>,
    configurations: RwLock<HashMap<String, T::Config>>,
    default_config: T::Config,
    // Serializes add/remove/replace and the notification that follows them.
    writer: Mutex<()>,
    events: EventPublisher<RegistryEvent<T>>,
}

impl<T: Registrable> Registry<T> {
    /// Creates an empty registry that builds instances from `default_config`.
    pub fn new(default_config: T::Config) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            configurations: RwLock::new(HashMap::new()),
            default_config,
            writer: Mutex::new(()),
            events: EventPublisher::new(),
        }
    }

    /// The configuration used for names without an override.
    pub fn default_config(&self) -> &T::Config {
        &self.default_config
    }

    /// Registers an override used when the instance called `name` is created.
    ///
    /// Instances that already exist keep their configuration; use
    /// [`replace`](Self::replace) to rebuild one.
    pub fn add_configuration(&self, name: impl Into<String>, config: T::Config) {
        crate::write(&self.configurations).insert(name.into(), config);
    }

    /// Returns the override registered for `name`, if any.
    pub fn configuration(&self, name: &str) -> Option<T::Config> {
        crate::read(&self.configurations).get(name).cloned()
    }

    /// Returns the instance called `name`, creating it on first use.
    ///
    /// The override registered for `name` is used if present, otherwise the
    /// default configuration.
    pub fn get_or_create(&self, name: &str) -> Arc<T> {
        if let Some(existing) = self.find(name) {
            return existing;
        }
        let config = self
            .configuration(name)
            .unwrap_or_else(|| self.default_config.clone());
        self.insert_if_absent(name, &config)
    }

    /// Returns the instance called `name`, creating it from `config` on first use.
    ///
    /// If the instance already exists, `config` is ignored.
    pub fn get_or_create_with(&self, name: &str, config: T::Config) -> Arc<T> {
        if let Some(existing) = self.find(name) {
            return existing;
        }
        self.insert_if_absent(name, &config)
    }

    fn insert_if_absent(&self, name: &str, config: &T::Config) -> Arc<T> {
        let _writer = crate::lock(&self.writer);
        // Another writer may have created it while we waited.
        if let Some(existing) = self.find(name) {
            return existing;
        }
        let entry = Arc::new(T::create(name, config));
        let len = {
            let mut entries = crate::write(&self.entries);
            entries.insert(name.to_string(), Arc::clone(&entry));
            entries.len()
        };

        #[cfg(feature = "tracing")]
        info!(registry = T::KIND, name, "registry entry added");

        self.record_len(len);
        self.events.emit(&RegistryEvent::Added {
            entry: Arc::clone(&entry),
            timestamp: Instant::now(),
        });
        entry
    }

    /// Returns the instance called `name` without creating it.
    pub fn find(&self, name: &str) -> Option<Arc<T>> {
        crate::read(&self.entries).get(name).cloned()
    }

    /// Returns every instance, ordered by name.
    pub fn all(&self) -> Vec<Arc<T>> {
        let mut all: Vec<_> = crate::read(&self.entries).values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Returns every name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = crate::read(&self.entries).keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of stored instances.
    pub fn len(&self) -> usize {
        crate::read(&self.entries).len()
    }

    /// Returns true if no instance is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the instance called `name` and returns it.
    ///
    /// Callers still holding the `Arc` keep a working instance; the next
    /// lookup creates a new one.
    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        let _writer = crate::lock(&self.writer);
        let (removed, len) = {
            let mut entries = crate::write(&self.entries);
            let removed = entries.remove(name)?;
            (removed, entries.len())
        };
        removed.shutdown();

        #[cfg(feature = "tracing")]
        info!(registry = T::KIND, name, "registry entry removed");

        self.record_len(len);
        self.events.emit(&RegistryEvent::Removed {
            entry: Arc::clone(&removed),
            timestamp: Instant::now(),
        });
        Some(removed)
    }

    /// Rebuilds the instance called `name` from `config` and returns the old one.
    ///
    /// The new instance starts with fresh state. Nothing happens (and `None`
    /// is returned) if no instance has that name.
    pub fn replace(&self, name: &str, config: T::Config) -> Option<Arc<T>> {
        let _writer = crate::lock(&self.writer);
        let new = Arc::new(T::create(name, &config));
        let old = {
            let mut entries = crate::write(&self.entries);
            let slot = entries.get_mut(name)?;
            std::mem::replace(slot, Arc::clone(&new))
        };
        old.shutdown();

        #[cfg(feature = "tracing")]
        info!(registry = T::KIND, name, "registry entry replaced");

        self.events.emit(&RegistryEvent::Replaced {
            old: Arc::clone(&old),
            new,
            timestamp: Instant::now(),
        });
        Some(old)
    }

    /// Removes every instance, notifying `Removed` for each in name order.
    pub fn clear(&self) {
        let _writer = crate::lock(&self.writer);
        let mut drained: Vec<Arc<T>> = crate::write(&self.entries)
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        drained.sort_by(|a, b| a.name().cmp(b.name()));
        self.record_len(0);
        for entry in drained {
            entry.shutdown();
            self.events.emit(&RegistryEvent::Removed {
                entry,
                timestamp: Instant::now(),
            });
        }
    }

    /// Subscribes to every lifecycle event.
    ///
    /// Subscribers run synchronously, in subscription order, while the
    /// registry's writer lock is held. They may look entries up with
    /// [`find`](Self::find), [`names`](Self::names) or `get_or_create` of an
    /// existing name.
    ///
    /// # Deadlocks
    ///
    /// A subscriber that adds, removes, replaces or clears entries of the
    /// same registry deadlocks. The same holds for the `on_added`,
    /// `on_removed` and `on_replaced` shorthands.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&RegistryEvent<T>) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(f);
    }

    /// Subscribes to instance creation.
    ///
    /// # Deadlocks
    ///
    /// Must not mutate this registry; see [`on_event`](Self::on_event).
    pub fn on_added<F>(&self, f: F)
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let RegistryEvent::Added { entry, .. } = event {
                f(entry);
            }
        });
    }

    /// Subscribes to instance removal.
    ///
    /// # Deadlocks
    ///
    /// Must not mutate this registry; see [`on_event`](Self::on_event).
    pub fn on_removed<F>(&self, f: F)
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let RegistryEvent::Removed { entry, .. } = event {
                f(entry);
            }
        });
    }

    /// Subscribes to replacement. The callback receives `(old, new)`.
    ///
    /// # Deadlocks
    ///
    /// Must not mutate this registry; see [`on_event`](Self::on_event).
    pub fn on_replaced<F>(&self, f: F)
    where
        F: Fn(&Arc<T>, &Arc<T>) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let RegistryEvent::Replaced { old, new, .. } = event {
                f(old, new);
            }
        });
    }

    #[allow(unused_variables)]
    fn record_len(&self, len: usize) {
        #[cfg(feature = "metrics")]
        gauge!("registry_entries", "registry" => T::KIND).set(len as f64);
    }
}

impl<T> Default for Registry<T>
where
    T: Registrable,
    T::Config: Default,
{
    fn default() -> Self {
        Self::new(T::Config::default())
    }
}

impl<T: Registrable> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &T::KIND)
            .field("names", &self.names())
            .finish()
    }
}
