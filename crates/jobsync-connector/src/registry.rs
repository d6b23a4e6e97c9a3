//! Adapter lookup by connector source.

use std::collections::HashMap;
use std::sync::Arc;

use jobsync_core::config::SyncConfig;
use jobsync_core::error::AppError;
use jobsync_entity::account::ConnectorSource;

use crate::adapter::SourceAdapter;
use crate::confluence::ConfluenceAdapter;
use crate::google_calendar::GoogleCalendarAdapter;
use crate::http::ApiClient;
use crate::jira::JiraAdapter;

/// Maps each source to the adapter that fetches it.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ConnectorSource, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled calendar, Jira, and Confluence adapters sharing one client.
    pub fn with_defaults(config: &SyncConfig) -> Result<Self, AppError> {
        let http = ApiClient::new(config)?;
        let mut registry = Self::new();
        registry.register(Arc::new(GoogleCalendarAdapter::new(
            http.clone(),
            config.page_size,
        )));
        registry.register(Arc::new(JiraAdapter::new(http.clone(), config.page_size)));
        registry.register(Arc::new(ConfluenceAdapter::new(http, config.page_size)));
        Ok(registry)
    }

    /// Register (or replace) the adapter for its source.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source(), adapter);
    }

    /// The adapter for `source`, if registered.
    pub fn get(&self, source: ConnectorSource) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source).cloned()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("sources", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
