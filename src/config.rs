//! Hub configuration

use crate::error::{Error, Result};

/// Configuration options for a hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Namespace qualifying broadcast names, shared by every process on the
    /// same container. Processes in different namespaces never signal each
    /// other even over the same broadcast fabric.
    pub namespace: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            namespace: "pigeonhole".to_string(),
        }
    }
}

impl HubConfig {
    /// Create a config with a custom namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Set the namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Reject configurations the hub cannot run with
    ///
    /// The namespace ends up as the prefix of every broadcast name with a
    /// `/` separator before the key, so it must be non-empty and must not
    /// itself contain the separator.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".to_string()));
        }
        if self.namespace.contains('/') {
            return Err(Error::Config(format!(
                "namespace must not contain '/': {:?}",
                self.namespace
            )));
        }

        Ok(())
    }
}
