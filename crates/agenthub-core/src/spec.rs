//! Agent spec envelope (`agentspec.yaml`).
//!
//! A published payload is normally an agent spec: shared metadata plus a
//! runtime section whose shape depends on the runtime type. The registry
//! engine never needs more than the raw bytes, so only the envelope and the
//! runtime tag are typed here; every other section (model, prompts,
//! capabilities, interface, resources, pricing, workflow steps, ...) is kept
//! as an opaque YAML value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A parsed agent spec document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Spec format version (e.g. "1.0").
    #[serde(default, rename = "version")]
    pub spec_version: Option<String>,
    /// Shared metadata (required).
    pub metadata: SpecMetadata,
    /// Runtime variant (required).
    pub runtime: Runtime,
    /// Every other top-level section, uninterpreted.
    #[serde(flatten)]
    pub sections: BTreeMap<String, serde_yaml::Value>,
}

/// Spec metadata shared by all runtime variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// How an agent runs, tagged by `runtime.type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Runtime {
    /// Pure prompt agent executed by the hosting model.
    Prompt {
        #[serde(default)]
        entry: Option<String>,
    },
    /// Python process.
    Python {
        #[serde(default)]
        entry: Option<String>,
        #[serde(default)]
        python: Option<PythonRuntime>,
    },
    /// Node.js process.
    #[serde(rename = "nodejs")]
    NodeJs {
        #[serde(default)]
        entry: Option<String>,
        #[serde(default)]
        nodejs: Option<NodeJsRuntime>,
    },
    /// Container image.
    Docker {
        #[serde(default)]
        docker: Option<DockerRuntime>,
    },
    /// Remotely hosted endpoint.
    Remote { remote: RemoteRuntime },
    /// Composition of other agents.
    Workflow,
}

impl Runtime {
    /// The `runtime.type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Runtime::Prompt { .. } => "prompt",
            Runtime::Python { .. } => "python",
            Runtime::NodeJs { .. } => "nodejs",
            Runtime::Docker { .. } => "docker",
            Runtime::Remote { .. } => "remote",
            Runtime::Workflow => "workflow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PythonRuntime {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeJsRuntime {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub package: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DockerRuntime {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub dockerfile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRuntime {
    pub endpoint: String,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl AgentSpec {
    /// Parse an agent spec from raw payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| CoreError::InvalidSpec {
            detail: format!("invalid UTF-8: {e}"),
        })?;
        let spec: AgentSpec = serde_yaml::from_str(text)?;

        if spec.metadata.name.trim().is_empty() {
            return Err(CoreError::InvalidSpec {
                detail: "metadata.name is required".to_string(),
            });
        }

        if let Runtime::Remote { remote } = &spec.runtime {
            if remote.endpoint.trim().is_empty() {
                return Err(CoreError::InvalidSpec {
                    detail: "runtime.remote.endpoint is required".to_string(),
                });
            }
        }

        Ok(spec)
    }

    /// Look up an uninterpreted top-level section.
    pub fn section(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.sections.get(key)
    }
}
