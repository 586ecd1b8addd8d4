//! Parking-slot directory
//!
//! Thin data-source service over the backend's slots collection. Reads are
//! single-step; realtime slot updates reach consumers through the push feed.

use crate::io::backend::{Backend, BackendError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Slot availability, using the backend's wire values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    #[serde(rename = "libre")]
    Free,
    #[serde(rename = "ocupado")]
    Occupied,
    #[serde(rename = "servicio")]
    InService,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Free => "libre",
            SlotStatus::Occupied => "ocupado",
            SlotStatus::InService => "servicio",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    #[serde(skip)]
    pub id: String,
    pub label: String,
    pub status: SlotStatus,
}

pub struct SlotDirectory {
    backend: Arc<dyn Backend>,
    collection: String,
}

impl SlotDirectory {
    pub fn new(backend: Arc<dyn Backend>, collection: &str) -> Self {
        Self { backend, collection: collection.to_string() }
    }

    /// All slots regardless of status
    pub async fn list_all(&self) -> Result<Vec<Slot>, BackendError> {
        let mut slots = Vec::new();
        for status in [SlotStatus::Free, SlotStatus::Occupied, SlotStatus::InService] {
            slots.extend(self.list_with_status(status).await?);
        }
        slots.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(slots)
    }

    /// Only slots currently free
    pub async fn list_free(&self) -> Result<Vec<Slot>, BackendError> {
        self.list_with_status(SlotStatus::Free).await
    }

    async fn list_with_status(&self, status: SlotStatus) -> Result<Vec<Slot>, BackendError> {
        let rows = self
            .backend
            .query_eq(&self.collection, "status", &json!(status.as_str()))
            .await?;
        let mut slots = Vec::with_capacity(rows.len());
        for (id, value) in rows {
            let mut slot: Slot = serde_json::from_value(value)?;
            slot.id = id;
            slots.push(slot);
        }
        Ok(slots)
    }

    /// Update one slot's status field
    pub async fn update_status(&self, slot_id: &str, status: SlotStatus) -> Result<(), BackendError> {
        let path = format!("{}/{}", self.collection, slot_id);
        self.backend.update_doc(&path, json!({ "status": status.as_str() })).await
    }
}
