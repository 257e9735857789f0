//! Export service: signed bundles, verification, soft deletion.

use crate::core::error::EngineError;
use crate::core::export::{self, Selector, VerifyReport};
use crate::core::policy::PolicyDocument;
use crate::core::store::CorpusStore;
use crate::repos::export::{ExportRecord, ExportRepository};

pub struct ExportService<'a> {
    store: &'a CorpusStore,
    policy: PolicyDocument,
}

impl<'a> ExportService<'a> {
    pub fn new(store: &'a CorpusStore, policy: PolicyDocument) -> Self {
        Self { store, policy }
    }

    /// Build, hash, and sign a bundle for the selectors.
    pub fn create(
        &self,
        user_id: &str,
        selectors: &[Selector],
    ) -> Result<ExportRecord, EngineError> {
        self.policy.check_write("create_export")?;
        export::create_export(self.store, user_id, selectors, &self.policy)
    }

    /// Parse selectors from their JSON form (CLI and transport surface).
    pub fn parse_selectors(raw: &str) -> Result<Vec<Selector>, EngineError> {
        let selectors: Vec<Selector> = serde_json::from_str(raw)
            .map_err(|e| EngineError::Validation(format!("bad selectors: {}", e)))?;
        Ok(selectors)
    }

    pub fn get(&self, export_id: &str) -> Result<ExportRecord, EngineError> {
        ExportRepository::new(self.store).read(export_id)
    }

    pub fn list(&self) -> Result<Vec<ExportRecord>, EngineError> {
        ExportRepository::new(self.store).list()
    }

    /// Re-hash the bundle on disk and re-verify the signature.
    pub fn verify(&self, export_id: &str) -> Result<VerifyReport, EngineError> {
        export::verify_export(self.store, export_id)
    }

    /// Soft delete: the record is marked, artifacts and audit trail stay.
    pub fn soft_delete(&self, user_id: &str, export_id: &str) -> Result<(), EngineError> {
        self.policy.check_write("export_soft_delete")?;
        export::soft_delete(self.store, user_id, export_id)
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "export",
        "version": "0.1.0",
        "description": "Deterministic signed export bundles with byte-exact verification",
        "operations": [
            { "name": "create", "parameters": ["selectors"] },
            { "name": "get", "parameters": ["export_id"] },
            { "name": "verify", "parameters": ["export_id"] },
            { "name": "soft_delete", "parameters": ["export_id"] }
        ],
        "storage": ["exports", "export_events", "storage/exports/<export_id>/"]
    })
}
