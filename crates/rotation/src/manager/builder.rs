//! Typestate builder for [`RotationManager`]
//!
//! `build()` exists only once both the store and the provider are set, so a
//! manager without either cannot be constructed.

use std::sync::Arc;

use latchkey_storage::Store;

use super::RotationManager;
use crate::clock::{Clock, SystemClock};
use crate::config::RotationConfig;
use crate::error::RotationResult;
use crate::provider::CredentialProvider;
use crate::secret::{RandomSecretGenerator, SecretGenerator};

/// Marker: required component not provided yet
#[derive(Debug, Clone, Copy, Default)]
pub struct Missing;

/// Builder for [`RotationManager`]
///
/// `S` and `P` are [`Missing`] until [`store`](Self::store) and
/// [`provider`](Self::provider) are called.
pub struct RotationManagerBuilder<S = Missing, P = Missing> {
    store: S,
    provider: P,
    config: RotationConfig,
    clock: Arc<dyn Clock>,
    generator: Option<Arc<dyn SecretGenerator>>,
}

impl RotationManagerBuilder {
    pub fn new() -> Self {
        Self {
            store: Missing,
            provider: Missing,
            config: RotationConfig::default(),
            clock: Arc::new(SystemClock),
            generator: None,
        }
    }
}

impl Default for RotationManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> RotationManagerBuilder<Missing, P> {
    /// Durable store for role records and the rotation journal (required)
    pub fn store(self, store: Arc<dyn Store>) -> RotationManagerBuilder<Arc<dyn Store>, P> {
        RotationManagerBuilder {
            store,
            provider: self.provider,
            config: self.config,
            clock: self.clock,
            generator: self.generator,
        }
    }
}

impl<S> RotationManagerBuilder<S, Missing> {
    /// External system the credentials live in (required)
    pub fn provider(
        self,
        provider: Arc<dyn CredentialProvider>,
    ) -> RotationManagerBuilder<S, Arc<dyn CredentialProvider>> {
        RotationManagerBuilder {
            store: self.store,
            provider,
            config: self.config,
            clock: self.clock,
            generator: self.generator,
        }
    }
}

impl<S, P> RotationManagerBuilder<S, P> {
    pub fn config(mut self, config: RotationConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source (default: [`SystemClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Secret source (default: [`RandomSecretGenerator`] of
    /// `config.secret_length`)
    pub fn secret_generator(mut self, generator: Arc<dyn SecretGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }
}

impl RotationManagerBuilder<Arc<dyn Store>, Arc<dyn CredentialProvider>> {
    /// Validate the config and assemble the manager
    ///
    /// The manager is idle until [`RotationManager::start`].
    pub fn build(self) -> RotationResult<RotationManager> {
        self.config.validate()?;
        let length = self.config.secret_length;
        let generator = self
            .generator
            .unwrap_or_else(|| -> Arc<dyn SecretGenerator> {
                Arc::new(RandomSecretGenerator::new(length))
            });
        Ok(RotationManager::from_parts(
            self.store,
            self.provider,
            generator,
            self.clock,
            self.config,
        ))
    }
}
