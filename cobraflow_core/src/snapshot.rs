//! Self-contained serialized copies of a network, shipped with every job request
//!
//! Workers never read the network store, everything a solver needs travels inside the
//! snapshot. Knockouts are applied before serialization so the snapshot already carries
//! the zeroed bounds of blocked reactions.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::io::json::JsonError;
use crate::jobs::NetworkId;
use crate::metabolic_model::model::{GprError, KnockoutReport, Model};
use crate::utils::hashing::hash_as_hex_string;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Network {0} does not exist")]
    NetworkNotFound(NetworkId),
    #[error("Unable to apply knockouts: {0}")]
    Knockout(#[from] GprError),
    #[error("Unable to (de)serialize the model: {0}")]
    Serialization(#[from] JsonError),
}

/// Serialized metabolic network with knockouts applied
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSnapshot {
    network_id: NetworkId,
    document: String,
}

impl ModelSnapshot {
    /// Knock out `knockouts` in a copy of `model` and serialize the result
    ///
    /// The caller's model is left untouched.
    pub fn build<I, S>(
        network_id: NetworkId,
        model: &Model,
        knockouts: I,
    ) -> Result<(ModelSnapshot, KnockoutReport), SnapshotError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut model = model.clone();
        let report = model.knock_out_genes(knockouts)?;
        let document = model.to_json_string()?;
        Ok((
            ModelSnapshot {
                network_id,
                document,
            },
            report,
        ))
    }

    /// Wrap a document received over the wire
    pub fn from_document(network_id: NetworkId, document: String) -> Self {
        Self {
            network_id,
            document,
        }
    }

    pub fn network_id(&self) -> &NetworkId {
        &self.network_id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn into_document(self) -> String {
        self.document
    }

    /// Rebuild the model, including knockout state
    pub fn load(&self) -> Result<Model, SnapshotError> {
        Ok(Model::from_json_str(&self.document)?)
    }

    /// Short hash of the document, equal snapshots share a fingerprint
    pub fn fingerprint(&self) -> String {
        hash_as_hex_string(self.document.as_str())
    }
}

/// Source of the current state of user networks
#[async_trait]
pub trait NetworkStore: Send + Sync {
    /// Load an owned copy of the network
    async fn load(&self, network_id: &NetworkId) -> Result<Model, SnapshotError>;
}

/// Network store held in memory
#[derive(Default)]
pub struct InMemoryNetworkStore {
    networks: DashMap<NetworkId, Model>,
}

impl InMemoryNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a network
    pub fn insert(&self, network_id: NetworkId, model: Model) {
        self.networks.insert(network_id, model);
    }

    pub fn remove(&self, network_id: &NetworkId) -> Option<Model> {
        self.networks.remove(network_id).map(|(_, model)| model)
    }
}

#[async_trait]
impl NetworkStore for InMemoryNetworkStore {
    async fn load(&self, network_id: &NetworkId) -> Result<Model, SnapshotError> {
        self.networks
            .get(network_id)
            .map(|model| model.value().clone())
            .ok_or_else(|| SnapshotError::NetworkNotFound(network_id.clone()))
    }
}
