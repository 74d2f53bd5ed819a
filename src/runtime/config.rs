//! Stream runtime configuration.
//!
//! These values tune buffering and limits of the interpreter. In most cases
//! you should use [`ExecutorBuilder`](super::builder::ExecutorBuilder) rather
//! than creating a [`StreamConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `par_join_buffer` | 1 |
//! | `default_chunk_size` | 64 |
//! | `max_par_join` | 1024 |
//! | `max_suppressed` | 64 |

/// Default output buffer between `par_join` inner streams and the consumer.
pub const DEFAULT_PAR_JOIN_BUFFER: usize = 1;
/// Default chunk size for generated streams such as `range`.
pub const DEFAULT_CHUNK_SIZE: usize = 64;
/// Default cap on concurrently running inner streams.
pub const DEFAULT_MAX_PAR_JOIN: usize = 1024;
/// Default cap on suppressed errors kept in a composite error.
pub const DEFAULT_MAX_SUPPRESSED: usize = 64;

/// Interpreter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Chunks buffered between `par_join` producers and the consumer.
    pub par_join_buffer: usize,
    /// Chunk size used by generated streams.
    pub default_chunk_size: usize,
    /// Upper bound on `par_join` concurrency; also used by `par_join_unbounded`.
    pub max_par_join: usize,
    /// Suppressed errors retained per composite error; excess is counted.
    pub max_suppressed: usize,
}

impl StreamConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.par_join_buffer == 0 {
            self.par_join_buffer = 1;
        }
        if self.default_chunk_size == 0 {
            self.default_chunk_size = 1;
        }
        if self.max_par_join == 0 {
            self.max_par_join = 1;
        }
    }

    /// Clamps a requested `par_join` width to `[1, max_par_join]`.
    #[must_use]
    pub fn clamp_par_join(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_par_join.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            par_join_buffer: DEFAULT_PAR_JOIN_BUFFER,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            max_par_join: DEFAULT_MAX_PAR_JOIN,
            max_suppressed: DEFAULT_MAX_SUPPRESSED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_table() {
        let config = StreamConfig::default();
        assert_eq!(config.par_join_buffer, 1);
        assert_eq!(config.default_chunk_size, 64);
        assert_eq!(config.max_par_join, 1024);
        assert_eq!(config.max_suppressed, 64);
    }

    #[test]
    fn normalize_fixes_zeroes() {
        let mut config = StreamConfig {
            par_join_buffer: 0,
            default_chunk_size: 0,
            max_par_join: 0,
            max_suppressed: 0,
        };
        config.normalize();
        assert_eq!(config.par_join_buffer, 1);
        assert_eq!(config.default_chunk_size, 1);
        assert_eq!(config.max_par_join, 1);
        // Zero suppressed is a valid "count only" setting.
        assert_eq!(config.max_suppressed, 0);
    }

    #[test]
    fn clamp_par_join_bounds() {
        let config = StreamConfig {
            max_par_join: 8,
            ..StreamConfig::default()
        };
        assert_eq!(config.clamp_par_join(0), 1);
        assert_eq!(config.clamp_par_join(3), 3);
        assert_eq!(config.clamp_par_join(100), 8);
    }
}
