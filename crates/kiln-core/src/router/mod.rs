use std::sync::Arc;

use tracing::trace;

use crate::gateway::ProviderGateway;

/// Configured providers, looked up by name.
#[derive(Default, Clone)]
pub struct ProviderRouter {
    providers: Vec<Arc<dyn ProviderGateway>>,
}

impl ProviderRouter {
    #[inline]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Register a provider. Lookups return the first provider registered under a name.
    #[inline]
    pub fn register(&mut self, provider: Arc<dyn ProviderGateway>) {
        trace!(provider = provider.name(), "provider registered");
        self.providers.push(provider);
    }

    pub fn with(mut self, provider: Arc<dyn ProviderGateway>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ProviderGateway>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ProviderGateway>> {
        self.providers.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
