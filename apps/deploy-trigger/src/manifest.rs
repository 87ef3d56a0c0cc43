use std::fs;
use std::path::{Path, PathBuf};

use runtime_manager_sdk::DeployKind;
use serde_json::{Map, Value};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("manifest must be a mapping at the top level")]
    NotAMapping,
    #[error("{0} not informed or couldn't be extracted")]
    MissingField(&'static str),
    #[error("{field} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("manifest kind '{0}' not recognized, expected application or shared-infrastructure")]
    UnrecognizedKind(String),
}

/// A validated deployment manifest. The typed fields are the ones the deploy
/// step interprets; `raw` is the whole document, forwarded as the request base.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    raw: Map<String, Value>,
    pub kind: DeployKind,
    pub id: String,
    pub version_tag: String,
    pub is_api: bool,
    pub env_id: String,
    pub workspace_id: String,
    pub checkout_branch: Option<String>,
    pub api_contract_path: Option<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(value)
    }

    /// Validate a parsed document. Fails on the first missing or malformed
    /// field, checked in a fixed order.
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let Value::Object(raw) = value else {
            return Err(ManifestError::NotAMapping);
        };

        let manifesto = present(&raw, "manifesto")?;
        let version_tag = scalar(present(&raw, "versionTag")?, "versionTag")?;
        let is_api = present(&raw, "isApi")?
            .as_bool()
            .ok_or(ManifestError::InvalidField {
                field: "isApi",
                expected: "a boolean",
            })?;
        let env_id = scalar(present(&raw, "envId")?, "envId")?;
        let workspace_id = scalar(present(&raw, "workspaceId")?, "workspaceId")?;

        let manifesto = manifesto.as_object().ok_or(ManifestError::InvalidField {
            field: "manifesto",
            expected: "a mapping",
        })?;
        let kind = manifesto
            .get("kind")
            .filter(|kind| !kind.is_null())
            .ok_or(ManifestError::MissingField("manifesto.kind"))?;
        let kind = match kind {
            Value::String(kind) => DeployKind::parse(kind)
                .ok_or_else(|| ManifestError::UnrecognizedKind(kind.clone()))?,
            other => return Err(ManifestError::UnrecognizedKind(other.to_string())),
        };
        let id = manifesto
            .get("spec")
            .and_then(Value::as_object)
            .and_then(|spec| spec.get("id"))
            .filter(|id| !id.is_null())
            .ok_or(ManifestError::MissingField("manifesto.spec.id"))
            .and_then(|id| scalar(id, "manifesto.spec.id"))?;

        let checkout_branch = raw
            .get("runConfig")
            .and_then(Value::as_object)
            .and_then(|run_config| run_config.get("checkoutBranch"))
            .filter(|branch| !branch.is_null())
            .map(|branch| scalar(branch, "runConfig.checkoutBranch"))
            .transpose()?;
        let api_contract_path = raw
            .get("apiContractPath")
            .filter(|path| !path.is_null())
            .map(|path| scalar(path, "apiContractPath"))
            .transpose()?;

        Ok(Self {
            raw,
            kind,
            id,
            version_tag,
            is_api,
            env_id,
            workspace_id,
            checkout_branch,
            api_contract_path,
        })
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

fn present<'a>(map: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ManifestError> {
    map.get(field)
        .filter(|value| !value.is_null())
        .ok_or(ManifestError::MissingField(field))
}

/// Strings pass through; YAML numbers such as `versionTag: 1.0` are rendered.
fn scalar(value: &Value, field: &'static str) -> Result<String, ManifestError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ManifestError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}
