//! Collaborator wiring.
//!
//! [`Services`] bundles every external collaborator the handlers and the
//! index synchronizer call through. It is built once at startup and shared
//! via `Arc` by all invocations.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use docgate_core::store::memory::{InMemoryIndex, InMemoryStore, RecordingPublisher};
use docgate_core::store::{
    DocumentStore, ObjectStore, ParameterStore, Publisher, SearchIndex, WebhookStore,
};

use crate::config::Config;
use crate::publish::HttpPublisher;
use crate::typesense::TypesenseIndex;

pub struct Services {
    pub config: Arc<Config>,
    pub documents: Arc<dyn DocumentStore>,
    pub webhooks: Arc<dyn WebhookStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub parameters: Arc<dyn ParameterStore>,
    pub publisher: Arc<dyn Publisher>,
    pub index: Arc<dyn SearchIndex>,
}

impl Services {
    /// Every collaborator in memory. Storage is shared by one
    /// [`InMemoryStore`]; the publisher records instead of sending.
    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            config: Arc::new(config),
            documents: store.clone(),
            webhooks: store.clone(),
            objects: store.clone(),
            parameters: store,
            publisher: Arc::new(RecordingPublisher::new()),
            index: Arc::new(InMemoryIndex::new()),
        }
    }

    /// Builds collaborators according to `[search]` and `[notify]`.
    ///
    /// Storage collaborators are in memory; deployments that persist
    /// documents swap them via the public fields.
    pub fn from_config(config: Config) -> Result<Self> {
        let mut services = Self::in_memory(config);
        let config = services.config.clone();

        if config.search.provider == "typesense" {
            services.index = Arc::new(TypesenseIndex::from_config(&config.search)?);
        }

        if config.notify.provider == "http" {
            services.publisher = Arc::new(HttpPublisher::new(Duration::from_secs(
                config.notify.timeout_secs,
            ))?);
        }

        Ok(services)
    }

    /// Replaces the search index.
    pub fn with_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = index;
        self
    }

    /// Replaces the publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }
}
