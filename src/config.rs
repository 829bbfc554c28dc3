//! Runtime configuration for the sanitization context.

use serde::Deserialize;

use crate::error::{Result, TaintError};

/// Upper bound accepted for [`TaintConfig::max_composed`].
///
/// The permutation check costs `k!` transformer applications; 8! is already
/// 40320 passes over the chunk.
pub const MAX_COMPOSED_CEILING: usize = 8;

/// Tunables consulted while sanitizing.
///
/// # Examples
///
/// ```
/// use policy_taint::TaintConfig;
///
/// let config = TaintConfig::from_json(r#"{ "max_composed": 4 }"#).unwrap();
/// assert_eq!(config.max_composed, 4);
/// assert!(config.audit);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaintConfig {
    /// Largest number of blended transformers the permutation check will run.
    pub max_composed: usize,
    /// Whether sanitization records events into the context's audit trail.
    pub audit: bool,
}

impl Default for TaintConfig {
    fn default() -> Self {
        Self {
            max_composed: 6,
            audit: true,
        }
    }
}

impl TaintConfig {
    /// Parses and validates a configuration from JSON.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TaintConfig =
            serde_json::from_str(json).map_err(|e| TaintError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every field is within its supported range.
    pub fn validate(&self) -> Result<()> {
        if self.max_composed == 0 || self.max_composed > MAX_COMPOSED_CEILING {
            return Err(TaintError::Config(format!(
                "max_composed must be between 1 and {}, got {}",
                MAX_COMPOSED_CEILING, self.max_composed
            )));
        }
        Ok(())
    }
}
