//! Plugin-based backend registry
//!
//! The registry allows DNS backends to be registered dynamically at runtime,
//! avoiding hardcoded if-else chains in the daemon.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddns_core::registry::ProviderRegistry;
//! use ddns_core::config::ProviderConfig;
//!
//! let registry = ProviderRegistry::new();
//! ddns_provider_cloudflare::register(&registry);
//!
//! let config = ProviderConfig::Cloudflare { ... };
//! let backend = registry.create_backend(&config)?;
//! ```
//!
//! ## Registration
//!
//! Backend crates register themselves during initialization:
//!
//! ```rust,ignore
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_backend("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsBackend, DnsBackendFactory};
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry of DNS backend factories keyed by provider type name
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    backends: RwLock<HashMap<String, Box<dyn DnsBackendFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS backend factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudflare")
    /// - `factory`: Factory object for creating backend instances
    pub fn register_backend(&self, name: impl Into<String>, factory: Box<dyn DnsBackendFactory>) {
        let mut backends = self.backends.write().unwrap_or_else(|p| p.into_inner());
        backends.insert(name.into(), factory);
    }

    /// Create a DNS backend from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsBackend>)`: Created backend instance
    /// - `Err(Error)`: If the provider type is not registered or creation fails
    pub fn create_backend(&self, config: &ProviderConfig) -> Result<Box<dyn DnsBackend>> {
        let provider_type = config.type_name();
        let backends = self.backends.read().unwrap_or_else(|p| p.into_inner());

        if let Some(factory) = backends.get(provider_type) {
            return factory.create(config);
        }
        drop(backends);

        Err(Error::config(format!(
            "Unknown provider type: {} (registered: {})",
            provider_type,
            self.list_backends().join(", ")
        )))
    }

    /// List all registered provider types, sorted
    pub fn list_backends(&self) -> Vec<String> {
        let backends = self.backends.read().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<String> = backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_backend(&self, name: &str) -> bool {
        let backends = self.backends.read().unwrap_or_else(|p| p.into_inner());
        backends.contains_key(name)
    }
}
