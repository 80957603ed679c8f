/*!
 * Shim Configuration
 * Runtime configuration for path routing
 */

use serde::{Deserialize, Serialize};

/// Shim configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// First path component routed to the async backend.
    ///
    /// A path is backend-routed iff its leading component, after an
    /// optional leading separator, equals this string. One prefix governs
    /// both routing and FD tracking.
    pub backend_prefix: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            backend_prefix: "persistent".to_string(),
        }
    }
}

impl ShimConfig {
    /// Configuration with a custom backend prefix
    pub fn with_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            backend_prefix: prefix.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefix() {
        assert_eq!(ShimConfig::default().backend_prefix, "persistent");
    }

    #[test]
    fn test_custom_prefix() {
        let config = ShimConfig::with_prefix("scratch");
        assert_eq!(config.backend_prefix, "scratch");
    }
}
