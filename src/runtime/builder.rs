//! Executor builder and handle.

use crate::error::Error;
use crate::runtime::config::StreamConfig;
use crate::runtime::dispatcher::{BoxFuture, Dispatcher, TokioDispatcher};
use crate::runtime::env_config::{apply_env_overrides, ConfigError};
use core::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Builder for an [`Executor`].
///
/// Values set here win over `FXSTREAM_*` environment variables, which win
/// over [`StreamConfig::default()`].
#[derive(Clone, Default)]
pub struct ExecutorBuilder {
    dispatcher: Option<Arc<dyn Dispatcher>>,
    par_join_buffer: Option<usize>,
    default_chunk_size: Option<usize>,
    max_par_join: Option<usize>,
    max_suppressed: Option<usize>,
    ignore_env: bool,
}

impl ExecutorBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit dispatcher instead of the ambient tokio runtime.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the `par_join` output buffer size.
    #[must_use]
    pub fn par_join_buffer(mut self, n: usize) -> Self {
        self.par_join_buffer = Some(n);
        self
    }

    /// Set the chunk size for generated streams.
    #[must_use]
    pub fn default_chunk_size(mut self, n: usize) -> Self {
        self.default_chunk_size = Some(n);
        self
    }

    /// Set the cap on concurrently running inner streams.
    #[must_use]
    pub fn max_par_join(mut self, n: usize) -> Self {
        self.max_par_join = Some(n);
        self
    }

    /// Set how many suppressed errors a composite error keeps.
    #[must_use]
    pub fn max_suppressed(mut self, n: usize) -> Self {
        self.max_suppressed = Some(n);
        self
    }

    /// Skip `FXSTREAM_*` environment overrides.
    #[must_use]
    pub fn ignore_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Resolve configuration and build the executor.
    pub fn build(self) -> Result<Executor, Error> {
        let mut config = StreamConfig::default();
        if !self.ignore_env {
            apply_env_overrides(&mut config)?;
        }
        if let Some(n) = self.par_join_buffer {
            config.par_join_buffer = n;
        }
        if let Some(n) = self.default_chunk_size {
            config.default_chunk_size = n;
        }
        if let Some(n) = self.max_par_join {
            config.max_par_join = n;
        }
        if let Some(n) = self.max_suppressed {
            config.max_suppressed = n;
        }
        config.normalize();

        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => {
                let tokio = TokioDispatcher::current()
                    .map_err(|e| ConfigError::MissingDispatcher(e.to_string()))?;
                Arc::new(tokio) as Arc<dyn Dispatcher>
            }
        };
        Ok(Executor {
            dispatcher,
            config: Arc::new(config),
        })
    }
}

/// Handle used by the interpreter to spawn fibers, sleep and read config.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Executor {
    dispatcher: Arc<dyn Dispatcher>,
    config: Arc<StreamConfig>,
}

impl Executor {
    /// Builds an executor on the ambient tokio runtime with default settings.
    pub fn current() -> Result<Self, Error> {
        ExecutorBuilder::new().build()
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Spawns a detached fiber.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.spawn(Box::pin(future));
    }

    /// A future completing after `duration`.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.dispatcher.sleep(duration)
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
