// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lazily constructed provider shared by every request of an engine.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use super::provider::{create_provider, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::errors::ProviderError;

type ProviderFactory =
    Box<dyn Fn() -> Result<Arc<dyn EmbeddingProvider>, ProviderError> + Send + Sync>;

/// Holds at most one provider, built on first use.
///
/// Concurrent first calls block on the same initialization; a failed
/// initialization is not cached and is retried by the next caller.
pub struct SharedProvider {
    cell: OnceCell<Arc<dyn EmbeddingProvider>>,
    factory: ProviderFactory,
}

impl SharedProvider {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmbeddingProvider>, ProviderError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    pub fn from_config(config: EmbeddingConfig) -> Self {
        Self::new(move || create_provider(&config))
    }

    /// Wraps an already constructed provider.
    pub fn preloaded(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(provider);
        Self {
            cell,
            factory: Box::new(|| Err(ProviderError::init("provider already initialized"))),
        }
    }

    pub fn get(&self) -> Result<&Arc<dyn EmbeddingProvider>, ProviderError> {
        self.cell.get_or_try_init(|| (self.factory)())
    }
}
