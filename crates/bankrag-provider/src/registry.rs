//! Process-wide provider cache.
//!
//! The registry is built once at startup and shared by `Arc`. `embedder()` and
//! `generator()` construct their backend on first use and then hand out the
//! same `Arc` until [`ProviderRegistry::invalidate`] or
//! [`ProviderRegistry::reconfigure`] drops it. Construction is serialized so
//! concurrent first callers share one instance.

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bankrag_core::config::{Mode, ProviderSettings};
use bankrag_core::error::Result;
use bankrag_core::traits::{EmbedProvider, Generator};
use tokio::sync::Mutex;
use tracing::info;

use crate::embed_provider::{LocalEmbedProvider, OpenAiEmbedProvider};
use crate::generate::{OllamaGenerator, OpenAiGenerator};

/// Builds backends for a given mode. Tests inject their own.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create_embedder(&self, settings: &ProviderSettings) -> Result<Arc<dyn EmbedProvider>>;
    async fn create_generator(&self, settings: &ProviderSettings) -> Result<Arc<dyn Generator>>;
}

/// Real backends, validated eagerly: a backend that cannot serve requests is
/// never cached.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFactory;

#[async_trait]
impl ProviderFactory for DefaultFactory {
    async fn create_embedder(&self, settings: &ProviderSettings) -> Result<Arc<dyn EmbedProvider>> {
        settings.validate()?;
        match settings.mode {
            Mode::Local if settings.use_fake_embeddings => {
                Ok(Arc::new(LocalEmbedProvider::hashing(settings.local.fake_dim)))
            }
            Mode::Local => {
                let provider =
                    LocalEmbedProvider::load(Path::new(&settings.local.model_dir), settings.local.max_tokens)
                        .await?;
                Ok(Arc::new(provider))
            }
            Mode::Cloud => {
                let provider = OpenAiEmbedProvider::new(&settings.cloud)?;
                provider.check().await?;
                Ok(Arc::new(provider))
            }
        }
    }

    async fn create_generator(&self, settings: &ProviderSettings) -> Result<Arc<dyn Generator>> {
        settings.validate()?;
        match settings.mode {
            Mode::Local => {
                let generator = OllamaGenerator::new(&settings.local, &settings.generation)?;
                generator.check().await?;
                Ok(Arc::new(generator))
            }
            Mode::Cloud => {
                let generator = OpenAiGenerator::new(&settings.cloud, &settings.generation)?;
                generator.check().await?;
                Ok(Arc::new(generator))
            }
        }
    }
}

pub struct ProviderRegistry {
    settings: RwLock<ProviderSettings>,
    factory: Arc<dyn ProviderFactory>,
    embedder: RwLock<Option<Arc<dyn EmbedProvider>>>,
    generator: RwLock<Option<Arc<dyn Generator>>>,
    init: Mutex<()>,
}

impl ProviderRegistry {
    /// Registry over the real backends. Fails fast on invalid settings
    /// (e.g. cloud mode without an API key).
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        Self::with_factory(settings, Arc::new(DefaultFactory))
    }

    pub fn with_factory(settings: ProviderSettings, factory: Arc<dyn ProviderFactory>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings: RwLock::new(settings),
            factory,
            embedder: RwLock::new(None),
            generator: RwLock::new(None),
            init: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> ProviderSettings { read(&self.settings).clone() }

    pub fn mode(&self) -> Mode { read(&self.settings).mode }

    pub async fn embedder(&self) -> Result<Arc<dyn EmbedProvider>> {
        if let Some(cached) = read(&self.embedder).clone() {
            return Ok(cached);
        }
        let _guard = self.init.lock().await;
        if let Some(cached) = read(&self.embedder).clone() {
            return Ok(cached);
        }
        let settings = self.settings();
        let created = self.factory.create_embedder(&settings).await?;
        info!(mode = %settings.mode, embedder = created.embedder_id(), dim = created.dim(), "embedding provider initialized");
        *write(&self.embedder) = Some(Arc::clone(&created));
        Ok(created)
    }

    pub async fn generator(&self) -> Result<Arc<dyn Generator>> {
        if let Some(cached) = read(&self.generator).clone() {
            return Ok(cached);
        }
        let _guard = self.init.lock().await;
        if let Some(cached) = read(&self.generator).clone() {
            return Ok(cached);
        }
        let settings = self.settings();
        let created = self.factory.create_generator(&settings).await?;
        info!(mode = %settings.mode, generator = created.generator_id(), "generation provider initialized");
        *write(&self.generator) = Some(Arc::clone(&created));
        Ok(created)
    }

    /// Drop cached instances; the next access re-creates them.
    pub async fn invalidate(&self) {
        let _guard = self.init.lock().await;
        *write(&self.embedder) = None;
        *write(&self.generator) = None;
        info!("provider cache invalidated");
    }

    /// Swap settings (e.g. a mode change) and drop cached instances.
    pub async fn reconfigure(&self, settings: ProviderSettings) -> Result<()> {
        settings.validate()?;
        let _guard = self.init.lock().await;
        let mode = settings.mode;
        *write(&self.settings) = settings;
        *write(&self.embedder) = None;
        *write(&self.generator) = None;
        info!(%mode, "providers reconfigured");
        Ok(())
    }

    /// Construct both backends now so connection problems surface at startup.
    pub async fn warm_up(&self) -> Result<()> {
        self.embedder().await?;
        self.generator().await?;
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankrag_core::error::Error;

    fn fake_local(dim: usize) -> ProviderSettings {
        let mut settings = ProviderSettings { use_fake_embeddings: true, ..ProviderSettings::default() };
        settings.local.fake_dim = dim;
        settings
    }

    #[tokio::test]
    async fn fake_local_embedder_is_cached() {
        let registry = ProviderRegistry::new(fake_local(64)).unwrap();
        let a = registry.embedder().await.unwrap();
        let b = registry.embedder().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.dim(), 64);
        assert_eq!(a.embedder_id(), "local:hashing:d64");
    }

    #[tokio::test]
    async fn cloud_without_key_is_rejected_up_front() {
        let settings = ProviderSettings { mode: Mode::Cloud, ..ProviderSettings::default() };
        assert!(matches!(ProviderRegistry::new(settings.clone()), Err(Error::Config(_))));
        assert!(matches!(DefaultFactory.create_embedder(&settings).await, Err(Error::Config(_))));
        assert!(matches!(DefaultFactory.create_generator(&settings).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn missing_model_dir_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut settings = ProviderSettings::default();
        settings.local.model_dir = tmp.path().join("absent").to_string_lossy().into_owned();
        let registry = ProviderRegistry::new(settings).unwrap();
        assert!(matches!(registry.embedder().await, Err(Error::Config(_))));
    }
}
