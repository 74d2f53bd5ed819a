//! `FXSTREAM_*` environment overrides for [`ExecutorBuilder`](super::builder::ExecutorBuilder).
//!
//! Builder methods win over the environment, which wins over
//! [`StreamConfig::default()`]. Each variable holds an unsigned integer;
//! surrounding whitespace is ignored.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FXSTREAM_PAR_JOIN_BUFFER` | `par_join_buffer` |
//! | `FXSTREAM_DEFAULT_CHUNK_SIZE` | `default_chunk_size` |
//! | `FXSTREAM_MAX_PAR_JOIN` | `max_par_join` |
//! | `FXSTREAM_MAX_SUPPRESSED` | `max_suppressed` |

use crate::runtime::config::StreamConfig;

/// Output buffer of `par_join`, in chunks.
pub const ENV_PAR_JOIN_BUFFER: &str = "FXSTREAM_PAR_JOIN_BUFFER";
/// Chunk size of generated streams.
pub const ENV_DEFAULT_CHUNK_SIZE: &str = "FXSTREAM_DEFAULT_CHUNK_SIZE";
/// Cap on inner streams `par_join` runs at once.
pub const ENV_MAX_PAR_JOIN: &str = "FXSTREAM_MAX_PAR_JOIN";
/// Cap on suppressed errors kept by a composite error.
pub const ENV_MAX_SUPPRESSED: &str = "FXSTREAM_MAX_SUPPRESSED";

type Field = fn(&mut StreamConfig) -> &mut usize;

const OVERRIDES: [(&str, Field); 4] = [
    (ENV_PAR_JOIN_BUFFER, |c| &mut c.par_join_buffer),
    (ENV_DEFAULT_CHUNK_SIZE, |c| &mut c.default_chunk_size),
    (ENV_MAX_PAR_JOIN, |c| &mut c.max_par_join),
    (ENV_MAX_SUPPRESSED, |c| &mut c.max_suppressed),
];

/// Reasons an [`Executor`](super::builder::Executor) could not be configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to something other than an unsigned integer.
    #[error("{var} must be an unsigned integer, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// The value as found.
        value: String,
    },
    /// No dispatcher was given and there is no ambient tokio runtime.
    #[error("no dispatcher configured: {0}")]
    MissingDispatcher(String),
}

/// Overwrites each field whose variable is set. Stops at the first value
/// that does not parse, leaving earlier fields applied.
pub fn apply_env_overrides(config: &mut StreamConfig) -> Result<(), ConfigError> {
    for (var, field) in OVERRIDES {
        let Ok(raw) = std::env::var(var) else {
            continue;
        };
        *field(config) = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw.clone() })?;
    }
    Ok(())
}
