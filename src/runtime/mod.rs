//! Executor, dispatcher and configuration.
//!
//! - [`config`]: Stream configuration and defaults
//! - [`env_config`]: `FXSTREAM_*` environment overrides
//! - [`builder`]: Executor builder and handle
//! - [`dispatcher`]: Fiber spawning and timers
//!
//! # Quick Start
//!
//! ```ignore
//! use fxstream::runtime::ExecutorBuilder;
//!
//! let executor = ExecutorBuilder::new().par_join_buffer(16).build()?;
//! let out = Stream::range(0..10).compile(&executor).to_vec().await?;
//! ```

pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod env_config;

pub use builder::{Executor, ExecutorBuilder};
pub use config::StreamConfig;
pub use dispatcher::{BoxFuture, Dispatcher, TokioDispatcher};
pub use env_config::ConfigError;
