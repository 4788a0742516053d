//! Resource service: relief stock levels and low-stock alerts.
//!
//! Every stock-touching mutation that leaves `current_stock` strictly below
//! `threshold` emits `resource.critical_low`. There is no debounce: two
//! decrements that both end below threshold emit two events. A rejected
//! mutation emits nothing.

use chrono::Utc;
use disa_bus::{Bus, EventPublisher};
use disa_events::{ResourceCriticalLow, Service};
use disa_types::{Resource, ResourceId, ResourceType};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::store::Store;

/// Fields supplied when registering a resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    /// Category.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Opening stock.
    pub current_stock: u32,
    /// Alert threshold.
    pub threshold: u32,
    /// Unit of measure.
    #[serde(default)]
    pub unit: Option<String>,
    /// Storage location.
    #[serde(default)]
    pub location: Option<String>,
}

/// Editable resource fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceUpdate {
    /// New category.
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New stock level.
    pub current_stock: Option<u32>,
    /// New threshold.
    pub threshold: Option<u32>,
    /// New unit.
    pub unit: Option<String>,
    /// New location.
    pub location: Option<String>,
}

/// Owns stock records and raises low-stock alerts.
#[derive(Debug, Clone)]
pub struct ResourceService {
    store: Store<Resource>,
    publisher: EventPublisher,
}

impl ResourceService {
    /// A service publishing inline on `bus`.
    pub fn new(bus: Bus) -> Self {
        Self::with_publisher(EventPublisher::best_effort(bus, Service::Resource))
    }

    /// A service using a prepared publisher.
    pub fn with_publisher(publisher: EventPublisher) -> Self {
        Self {
            store: Store::new(),
            publisher,
        }
    }

    /// Register a resource. Alerts at once if it starts below threshold.
    pub async fn create(&self, input: NewResource) -> Resource {
        let now = Utc::now();
        let resource = self
            .store
            .insert_with(|id| Resource {
                id: ResourceId::new(id),
                resource_code: format!("RES-{id:03}"),
                resource_type: input.resource_type,
                name: input.name,
                description: input.description,
                current_stock: input.current_stock,
                threshold: input.threshold,
                unit: input.unit,
                location: input.location,
                created_at: now,
                updated_at: now,
            })
            .await;
        info!(resource_code = resource.resource_code, stock = resource.current_stock, "resource registered");
        self.alert_if_low(&resource).await;
        resource
    }

    /// Look up one resource.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn get(&self, id: ResourceId) -> Result<Resource, ServiceError> {
        self.store
            .get(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("resource", id))
    }

    /// Every resource.
    pub async fn list(&self) -> Vec<Resource> {
        self.store.list().await
    }

    /// Resources of one category.
    pub async fn by_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        self.store.filter(|r| r.resource_type == resource_type).await
    }

    /// Resources strictly below their threshold.
    pub async fn low_stock(&self) -> Vec<Resource> {
        self.store.filter(Resource::is_critically_low).await
    }

    /// Edit a resource.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn update(
        &self,
        id: ResourceId,
        changes: ResourceUpdate,
    ) -> Result<Resource, ServiceError> {
        self.mutate(id, |r| {
            if let Some(t) = changes.resource_type {
                r.resource_type = t;
            }
            if let Some(n) = changes.name {
                r.name = n;
            }
            if changes.description.is_some() {
                r.description = changes.description;
            }
            if let Some(s) = changes.current_stock {
                r.current_stock = s;
            }
            if let Some(t) = changes.threshold {
                r.threshold = t;
            }
            if changes.unit.is_some() {
                r.unit = changes.unit;
            }
            if changes.location.is_some() {
                r.location = changes.location;
            }
            Ok(())
        })
        .await
    }

    /// Overwrite the stock level.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn set_stock(&self, id: ResourceId, quantity: u32) -> Result<Resource, ServiceError> {
        self.mutate(id, |r| {
            r.current_stock = quantity;
            Ok(())
        })
        .await
    }

    /// Add `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Invalid`] if
    /// the new level would overflow.
    pub async fn increment(&self, id: ResourceId, quantity: u32) -> Result<Resource, ServiceError> {
        self.mutate(id, |r| {
            r.current_stock = r.current_stock.checked_add(quantity).ok_or_else(|| {
                ServiceError::Invalid(format!(
                    "adding {quantity} to {} overflows the stock counter",
                    r.resource_code
                ))
            })?;
            Ok(())
        })
        .await
    }

    /// Remove `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Insufficient`]
    /// if fewer than `quantity` units are on hand. Nothing changes and no
    /// event is emitted on error.
    pub async fn decrement(&self, id: ResourceId, quantity: u32) -> Result<Resource, ServiceError> {
        self.mutate(id, |r| {
            r.current_stock =
                r.current_stock
                    .checked_sub(quantity)
                    .ok_or(ServiceError::Insufficient {
                        what: "stock",
                        requested: quantity,
                        available: r.current_stock,
                    })?;
            Ok(())
        })
        .await
    }

    /// Delete a resource.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn delete(&self, id: ResourceId) -> Result<(), ServiceError> {
        self.store
            .remove(id.into_inner())
            .await
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("resource", id))
    }

    /// Apply `change` under the store lock, then alert if the committed
    /// row is below threshold.
    async fn mutate(
        &self,
        id: ResourceId,
        change: impl FnOnce(&mut Resource) -> Result<(), ServiceError>,
    ) -> Result<Resource, ServiceError> {
        let resource = self
            .store
            .update(id.into_inner(), |r| {
                let mut draft = r.clone();
                change(&mut draft)?;
                draft.updated_at = Utc::now();
                *r = draft;
                Ok(r.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("resource", id))??;
        self.alert_if_low(&resource).await;
        Ok(resource)
    }

    async fn alert_if_low(&self, resource: &Resource) {
        if !resource.is_critically_low() {
            return;
        }
        warn!(
            resource_code = resource.resource_code,
            stock = resource.current_stock,
            threshold = resource.threshold,
            "resource critically low"
        );
        self.publisher
            .emit(ResourceCriticalLow {
                resource_id: Some(resource.id),
                resource_code: Some(resource.resource_code.clone()),
                name: Some(resource.name.clone()),
                resource_type: Some(resource.resource_type),
                current_stock: Some(resource.current_stock),
                threshold: Some(resource.threshold),
                location: resource.location.clone(),
            })
            .await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use disa_bus::MemoryBus;
    use disa_events::{Event, EventEnvelope, QueueBinding, RoutingKey};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    fn water(stock: u32, threshold: u32) -> NewResource {
        NewResource {
            resource_type: ResourceType::Water,
            name: "Bottled water".to_owned(),
            description: None,
            current_stock: stock,
            threshold,
            unit: Some("liters".to_owned()),
            location: Some("Warehouse B".to_owned()),
        }
    }

    async fn tapped() -> (UnboundedReceiver<disa_bus::Delivery>, ResourceService) {
        let memory = MemoryBus::new();
        memory
            .declare(&QueueBinding::durable("tap", RoutingKey::ResourceCriticalLow.as_str()))
            .await;
        let service = ResourceService::new(Bus::Memory(memory.clone()));
        let rx = memory.subscribe("tap").await.unwrap();
        (rx, service)
    }

    fn alerts(rx: &mut UnboundedReceiver<disa_bus::Delivery>) -> Vec<ResourceCriticalLow> {
        let mut out = Vec::new();
        while let Ok(delivery) = rx.try_recv() {
            if let Event::ResourceCriticalLow(p) =
                EventEnvelope::decode(&delivery.body, None).unwrap().event
            {
                out.push(p);
            }
        }
        out
    }

    #[tokio::test]
    async fn decrement_below_threshold_alerts_once_per_mutation() {
        let (mut rx, service) = tapped().await;
        let resource = service.create(water(100, 50)).await;
        assert!(alerts(&mut rx).is_empty());

        let after = service.decrement(resource.id, 60).await.unwrap();
        assert_eq!(after.current_stock, 40);
        let first = alerts(&mut rx);
        assert_eq!(first.len(), 1);
        assert_eq!(first.first().and_then(|p| p.current_stock), Some(40));
        assert_eq!(first.first().and_then(|p| p.location.clone()).as_deref(), Some("Warehouse B"));

        service.decrement(resource.id, 5).await.unwrap();
        let second = alerts(&mut rx);
        assert_eq!(second.len(), 1);
        assert_eq!(second.first().and_then(|p| p.current_stock), Some(35));
    }

    #[tokio::test]
    async fn stock_at_threshold_is_not_low() {
        let (mut rx, service) = tapped().await;
        let resource = service.create(water(100, 50)).await;
        service.decrement(resource.id, 50).await.unwrap();
        assert!(alerts(&mut rx).is_empty());
        assert!(service.low_stock().await.is_empty());
    }

    #[tokio::test]
    async fn insufficient_stock_is_rejected_silently() {
        let (mut rx, service) = tapped().await;
        let resource = service.create(water(10, 50)).await;
        assert_eq!(alerts(&mut rx).len(), 1);

        let result = service.decrement(resource.id, 11).await;
        assert!(matches!(
            result,
            Err(ServiceError::Insufficient { requested: 11, available: 10, .. })
        ));
        assert_eq!(service.get(resource.id).await.unwrap().current_stock, 10);
        assert!(alerts(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn every_stock_path_checks_the_threshold() {
        let (mut rx, service) = tapped().await;
        let resource = service.create(water(100, 50)).await;

        service.set_stock(resource.id, 20).await.unwrap();
        service.increment(resource.id, 5).await.unwrap();
        service
            .update(
                resource.id,
                ResourceUpdate {
                    threshold: Some(10),
                    ..ResourceUpdate::default()
                },
            )
            .await
            .unwrap();
        let stocks: Vec<_> = alerts(&mut rx).iter().map(|p| p.current_stock).collect();
        assert_eq!(stocks, vec![Some(20), Some(25)]);

        assert!(matches!(
            service.increment(resource.id, u32::MAX).await,
            Err(ServiceError::Invalid(_))
        ));
        assert_eq!(service.by_type(ResourceType::Water).await.len(), 1);
        assert!(service.by_type(ResourceType::Food).await.is_empty());
    }
}
