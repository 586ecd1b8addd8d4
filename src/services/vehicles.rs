//! Vehicle registry
//!
//! Register, list, update and delete the user's vehicles. Validation
//! mirrors the product rules: licence plate at most 9 characters, plate,
//! brand and model required.

use crate::io::backend::{Backend, BackendError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

const MAX_LICENCE_LEN: usize = 9;

#[derive(Debug, Error)]
pub enum VehicleError {
    #[error("invalid vehicle: {0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(skip)]
    pub id: String,
    pub licence: String,
    pub brand: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Registration input before validation
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub licence: String,
    pub brand: String,
    pub model: String,
    pub year: Option<String>,
}

pub struct VehicleRegistry {
    backend: Arc<dyn Backend>,
    collection: String,
}

impl VehicleRegistry {
    pub fn new(backend: Arc<dyn Backend>, collection: &str) -> Self {
        Self { backend, collection: collection.to_string() }
    }

    /// The user's registered vehicles
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Vehicle>, BackendError> {
        let rows = self
            .backend
            .query_eq(&self.collection, "userId", &json!(user_id))
            .await?;
        let mut vehicles = Vec::with_capacity(rows.len());
        for (id, value) in rows {
            let mut vehicle: Vehicle = serde_json::from_value(value)?;
            vehicle.id = id;
            vehicles.push(vehicle);
        }
        Ok(vehicles)
    }

    /// Register a vehicle for the user; returns the new document id
    pub async fn register(&self, user_id: &str, new: NewVehicle) -> Result<String, VehicleError> {
        let licence = new.licence.trim().to_uppercase();
        if licence.is_empty() {
            return Err(VehicleError::Invalid("licence plate is required"));
        }
        if licence.chars().count() > MAX_LICENCE_LEN {
            return Err(VehicleError::Invalid("licence plate is too long"));
        }
        if new.brand.trim().is_empty() {
            return Err(VehicleError::Invalid("brand is required"));
        }
        if new.model.trim().is_empty() {
            return Err(VehicleError::Invalid("model is required"));
        }

        let vehicle = Vehicle {
            id: String::new(),
            licence,
            brand: new.brand.trim().to_string(),
            model: new.model.trim().to_string(),
            year: new.year,
            user_id: user_id.to_string(),
        };
        let id = self
            .backend
            .add_doc(&self.collection, serde_json::to_value(&vehicle).map_err(BackendError::from)?)
            .await?;
        Ok(id)
    }

    /// Replace an existing vehicle's editable fields
    pub async fn update(&self, vehicle: &Vehicle) -> Result<(), BackendError> {
        let path = format!("{}/{}", self.collection, vehicle.id);
        self.backend
            .update_doc(
                &path,
                json!({
                    "licence": vehicle.licence,
                    "brand": vehicle.brand,
                    "model": vehicle.model,
                    "year": vehicle.year,
                }),
            )
            .await
    }

    pub async fn delete(&self, vehicle_id: &str) -> Result<(), BackendError> {
        let path = format!("{}/{}", self.collection, vehicle_id);
        self.backend.delete_doc(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryBackend;

    fn new_vehicle(licence: &str) -> NewVehicle {
        NewVehicle {
            licence: licence.to_string(),
            brand: "Toyota".to_string(),
            model: "Corolla".to_string(),
            year: Some("2020".to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let backend = Arc::new(MemoryBackend::new());
        let registry = VehicleRegistry::new(backend.clone(), "vehicles");

        let id = registry.register("u1", new_vehicle("abc-123")).await.unwrap();
        registry.register("u2", new_vehicle("zzz-999")).await.unwrap();

        let vehicles = registry.list_for_user("u1").await.unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].id, id);
        // Plate normalized to uppercase
        assert_eq!(vehicles[0].licence, "ABC-123");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let backend = Arc::new(MemoryBackend::new());
        let registry = VehicleRegistry::new(backend, "vehicles");

        assert!(matches!(
            registry.register("u1", new_vehicle("")).await,
            Err(VehicleError::Invalid(_))
        ));
        assert!(matches!(
            registry.register("u1", new_vehicle("TOOLONGPLATE")).await,
            Err(VehicleError::Invalid(_))
        ));

        let mut missing_brand = new_vehicle("ok-1");
        missing_brand.brand = "  ".to_string();
        assert!(matches!(
            registry.register("u1", missing_brand).await,
            Err(VehicleError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let backend = Arc::new(MemoryBackend::new());
        let registry = VehicleRegistry::new(backend.clone(), "vehicles");

        let id = registry.register("u1", new_vehicle("abc-123")).await.unwrap();
        let mut vehicle = registry.list_for_user("u1").await.unwrap().remove(0);
        vehicle.model = "Yaris".to_string();
        registry.update(&vehicle).await.unwrap();

        let doc = backend.get_doc(&format!("vehicles/{id}")).await.unwrap().unwrap();
        assert_eq!(doc["model"], "Yaris");

        registry.delete(&id).await.unwrap();
        assert!(registry.list_for_user("u1").await.unwrap().is_empty());
    }
}
