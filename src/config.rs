//! Configuration types for an X-Road adapter.

use crate::constants::{ANY_NAMESPACE, MULTIPART_RELATED, TEXT_XML};
use crate::error::XRoadError;
use crate::header::IdentifierMode;
use crate::member::ProducerMember;
use crate::message::WrapperPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Config version
    pub version: String,

    /// General settings
    pub settings: SettingsConfig,

    /// Producer namespace of the adapter's services
    pub producer: ProducerConfig,

    /// Default wrapper and namespace policy for messages
    pub wrappers: WrapperPolicy,

    /// Identifier reconstruction
    pub identifiers: IdentifiersConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            producer: ProducerConfig::default(),
            wrappers: WrapperPolicy::default(),
            identifiers: IdentifiersConfig::default(),
        }
    }
}

impl AdapterConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, XRoadError> {
        serde_yaml::from_str(yaml).map_err(|e| XRoadError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, XRoadError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Maximum inbound message size (bytes)
    pub max_message_size: usize,

    /// Accepted Content-Type prefixes for inbound messages
    pub allowed_content_types: Vec<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_message_size: 4_194_304, // 4MB
            allowed_content_types: vec![TEXT_XML.to_string(), MULTIPART_RELATED.to_string()],
        }
    }
}

impl SettingsConfig {
    /// Does `content_type` start with one of the allowed types? Case-insensitive.
    pub fn accepts(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        self.allowed_content_types
            .iter()
            .any(|allowed| content_type.starts_with(&allowed.to_ascii_lowercase()))
    }
}

/// Producer namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Namespace URI of request and response bodies; unset accepts any namespace
    pub namespace_url: Option<String>,

    /// Prefix used when the namespace is written
    pub namespace_prefix: Option<String>,
}

impl ProducerConfig {
    /// Namespace to search inbound bodies in.
    pub fn search_namespace(&self) -> &str {
        self.namespace_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(ANY_NAMESPACE)
    }

    /// Put the configured namespace on `producer`.
    ///
    /// Unset values keep what was read from the inbound body element.
    pub fn stamp(&self, producer: &mut ProducerMember) {
        let url = non_empty(&self.namespace_url).or(producer.namespace_url.as_deref());
        let prefix = non_empty(&self.namespace_prefix).or(producer.namespace_prefix.as_deref());
        let (url, prefix) = (url.map(String::from), prefix.map(String::from));
        producer.set_namespace(url.as_deref(), prefix.as_deref());
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Identifier reconstruction settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifiersConfig {
    pub mode: IdentifierMode,
}
