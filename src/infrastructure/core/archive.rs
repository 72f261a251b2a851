use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::core::{
    ArchiveRepository, ArchivedBooking, ArchivedBookingEvent, BookingId, ResourceId,
};
use crate::domain::{Aggregation, DataAccessError, Entity};

/// In-memory archive. No delete: records are only ever flagged hidden.
#[derive(Clone, Default)]
pub struct MemoryArchiveRepository {
    rows: Arc<RwLock<Vec<ArchivedBooking>>>,
    journal: Arc<RwLock<Vec<ArchivedBookingEvent>>>,
}

impl MemoryArchiveRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn journal(&self) -> Vec<ArchivedBookingEvent> {
        self.journal.read().await.clone()
    }
}

#[async_trait]
impl ArchiveRepository for MemoryArchiveRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<ArchivedBooking>, DataAccessError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|r| r.id() == *id)
            .cloned())
    }

    async fn list_by_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<ArchivedBooking>, DataAccessError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.resource_id() == resource_id)
            .cloned()
            .collect())
    }

    async fn save(&mut self, entity: &mut ArchivedBooking) -> Result<bool, DataAccessError> {
        if entity.peek().is_none() {
            return Ok(false);
        }
        self.journal.write().await.extend(entity.pop_all());
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.id() == entity.id()) {
            Some(row) => *row = entity.clone(),
            None => rows.push(entity.clone()),
        }
        Ok(true)
    }
}
