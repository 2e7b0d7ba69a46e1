//! Queue selection criteria.

use serde::{Deserialize, Serialize};

/// Criteria the server uses to pick the next pipeline for this worker.
///
/// An empty `platform` means "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub platform: String,
}

impl Filter {
    /// Match any queued pipeline.
    pub fn any() -> Self {
        Self::default()
    }

    /// Match pipelines targeting `platform` (e.g. `linux/amd64`).
    pub fn platform(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.platform.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_filter_is_empty() {
        assert!(Filter::any().is_empty());
        assert!(!Filter::platform("linux/arm64").is_empty());
    }

    #[test]
    fn decodes_missing_platform_as_empty() {
        let filter: Filter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter, Filter::any());
    }
}
