//! Deploy request assembly.
//!
//! The manifest document is the base object. A fixed list of overlays is then
//! applied in order, each replacing one top-level key.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::manifest::Manifest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketLocation {
    pub bucket: String,
    pub region: String,
}

/// State (`tfstate`) and artifact (`iac`) storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageConfig {
    pub tfstate: BucketLocation,
    pub iac: BucketLocation,
}

/// CI identifiers used to link a run back to the workflow that started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    pub server_url: String,
    pub repository: String,
    pub run_id: String,
}

impl PipelineContext {
    pub fn url(&self) -> String {
        format!(
            "{}/{}/actions/runs/{}",
            self.server_url.trim_end_matches('/'),
            self.repository.trim_matches('/'),
            self.run_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct DeployRequest(Map<String, Value>);

impl DeployRequest {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self(manifest.raw().clone())
    }

    /// Shallow overlay: the key's previous value, nested or not, is replaced.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Storage(StorageConfig),
    PipelineUrl(String),
    Branch(String),
    ApiContractPath(String),
}

impl Overlay {
    pub fn key(&self) -> &'static str {
        match self {
            Overlay::Storage(_) => "config",
            Overlay::PipelineUrl(_) => "pipelineUrl",
            Overlay::Branch(_) => "runConfig",
            Overlay::ApiContractPath(_) => "apiContractPath",
        }
    }

    pub fn apply(self, request: DeployRequest) -> DeployRequest {
        let key = self.key();
        let value = match self {
            Overlay::Storage(storage) => json!(storage),
            Overlay::PipelineUrl(url) => Value::String(url),
            Overlay::Branch(branch) => json!({ "branch": branch }),
            Overlay::ApiContractPath(path) => Value::String(path),
        };
        request.with(key, value)
    }
}

/// Overlays for a manifest, in application order. Optional entries are left
/// out entirely when the manifest does not carry them.
pub fn overlays(
    manifest: &Manifest,
    storage: &StorageConfig,
    pipeline: &PipelineContext,
) -> Vec<Overlay> {
    let mut overlays = vec![
        Overlay::Storage(storage.clone()),
        Overlay::PipelineUrl(pipeline.url()),
    ];
    if let Some(branch) = &manifest.checkout_branch {
        info!(%branch, "branch informed");
        overlays.push(Overlay::Branch(branch.clone()));
    }
    if let Some(path) = &manifest.api_contract_path {
        info!(%path, "api contract path informed");
        overlays.push(Overlay::ApiContractPath(path.clone()));
    }
    overlays
}

pub fn build_deploy_request(
    manifest: &Manifest,
    storage: &StorageConfig,
    pipeline: &PipelineContext,
) -> DeployRequest {
    overlays(manifest, storage, pipeline)
        .into_iter()
        .fold(DeployRequest::from_manifest(manifest), |request, overlay| {
            overlay.apply(request)
        })
}
