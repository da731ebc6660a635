//! In-memory Inventory service.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::clients::convert::{filter_from_proto, parse_uuid, part_to_proto};
use crate::clients::{ClientError, InventoryClient, Result};
use crate::domain::{Category, Dimensions, Manufacturer, MetadataValue, Part, PartsFilter};
use crate::proto::inventory::v1::inventory_service_server::InventoryService;
use crate::proto::inventory::v1::{
    GetPartRequest, GetPartResponse, ListPartsRequest, ListPartsResponse,
};

/// Parts catalog held in memory, in insertion order.
#[derive(Default)]
pub struct InventoryCatalog {
    parts: RwLock<Vec<Part>>,
}

impl InventoryCatalog {
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            parts: RwLock::new(parts),
        }
    }

    /// Catalog preloaded with [`seed_catalog`].
    pub fn seeded() -> Self {
        Self::new(seed_catalog())
    }

    /// Insert or replace a part.
    pub async fn upsert(&self, part: Part) {
        let mut parts = self.parts.write().await;
        match parts.iter_mut().find(|p| p.id == part.id) {
            Some(existing) => *existing = part,
            None => parts.push(part),
        }
    }

    pub async fn find_parts(&self, filter: &PartsFilter) -> Vec<Part> {
        self.parts
            .read()
            .await
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    pub async fn find_part(&self, part_id: Uuid) -> Option<Part> {
        self.parts
            .read()
            .await
            .iter()
            .find(|p| p.id == part_id)
            .cloned()
    }
}

#[async_trait]
impl InventoryClient for InventoryCatalog {
    async fn list_parts(&self, filter: &PartsFilter) -> Result<Vec<Part>> {
        Ok(self.find_parts(filter).await)
    }

    async fn get_part(&self, part_id: Uuid) -> Result<Part> {
        self.find_part(part_id)
            .await
            .ok_or_else(|| ClientError::NotFound(format!("part {part_id}")))
    }
}

#[tonic::async_trait]
impl InventoryService for InventoryCatalog {
    async fn get_part(
        &self,
        request: Request<GetPartRequest>,
    ) -> std::result::Result<Response<GetPartResponse>, Status> {
        let part_id = parse_uuid("uuid", &request.into_inner().uuid)?;
        let part = self
            .find_part(part_id)
            .await
            .ok_or_else(|| Status::not_found(format!("part {part_id}")))?;

        Ok(Response::new(GetPartResponse {
            part: Some(part_to_proto(&part)),
        }))
    }

    async fn list_parts(
        &self,
        request: Request<ListPartsRequest>,
    ) -> std::result::Result<Response<ListPartsResponse>, Status> {
        let filter = match request.into_inner().filter {
            Some(filter) => filter_from_proto(filter)?,
            None => PartsFilter::default(),
        };
        let parts = self.find_parts(&filter).await;

        Ok(Response::new(ListPartsResponse {
            parts: parts.iter().map(part_to_proto).collect(),
        }))
    }
}

/// Demo catalog for standalone runs. Ids are fixed so requests can be
/// scripted.
pub fn seed_catalog() -> Vec<Part> {
    fn manufacturer(name: &str, country: &str, website: &str) -> Option<Manufacturer> {
        Some(Manufacturer {
            name: name.to_string(),
            country: country.to_string(),
            website: website.to_string(),
        })
    }

    vec![
        Part {
            id: Uuid::from_u128(0x6f1c_2a3e_0000_4000_8000_0000_0000_0001),
            name: "Hyperion main engine".to_string(),
            description: "Ion thruster for interplanetary cruisers".to_string(),
            price: 1_250_000,
            stock_quantity: 12,
            category: Category::Engine,
            dimensions: Some(Dimensions {
                length: 420.0,
                width: 180.0,
                height: 180.0,
                weight: 2_300.0,
            }),
            manufacturer: manufacturer("Orbital Works", "Japan", "https://orbital.example"),
            tags: vec!["engine".to_string(), "ion".to_string()],
            metadata: HashMap::from([(
                "thrust_kn".to_string(),
                MetadataValue::Double(92.5),
            )]),
        },
        Part {
            id: Uuid::from_u128(0x6f1c_2a3e_0000_4000_8000_0000_0000_0002),
            name: "Deuterium tank".to_string(),
            description: "Pressurised fuel cell".to_string(),
            price: 310_000,
            stock_quantity: 40,
            category: Category::Fuel,
            dimensions: Some(Dimensions {
                length: 200.0,
                width: 90.0,
                height: 90.0,
                weight: 640.0,
            }),
            manufacturer: manufacturer("Nordfuel", "Norway", "https://nordfuel.example"),
            tags: vec!["fuel".to_string()],
            metadata: HashMap::from([(
                "capacity_l".to_string(),
                MetadataValue::Int(5_000),
            )]),
        },
        Part {
            id: Uuid::from_u128(0x6f1c_2a3e_0000_4000_8000_0000_0000_0003),
            name: "Quartz porthole".to_string(),
            description: "Radiation-shielded viewport".to_string(),
            price: 45_000,
            stock_quantity: 150,
            category: Category::Porthole,
            dimensions: Some(Dimensions {
                length: 60.0,
                width: 60.0,
                height: 12.0,
                weight: 35.0,
            }),
            manufacturer: manufacturer("Clearview", "Germany", "https://clearview.example"),
            tags: vec!["porthole".to_string(), "glass".to_string()],
            metadata: HashMap::from([("shielded".to_string(), MetadataValue::Bool(true))]),
        },
        Part {
            id: Uuid::from_u128(0x6f1c_2a3e_0000_4000_8000_0000_0000_0004),
            name: "Delta wing".to_string(),
            description: "Atmospheric re-entry wing".to_string(),
            price: 780_000,
            stock_quantity: 8,
            category: Category::Wing,
            dimensions: Some(Dimensions {
                length: 900.0,
                width: 450.0,
                height: 40.0,
                weight: 1_800.0,
            }),
            manufacturer: manufacturer("Orbital Works", "Japan", "https://orbital.example"),
            tags: vec!["wing".to_string()],
            metadata: HashMap::from([(
                "material".to_string(),
                MetadataValue::String("titanium".to_string()),
            )]),
        },
    ]
}
