use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::core::{
    BookingId, BookingRequest, BookingRequestEvent, BookingRequestRepository, ResourceId,
};
use crate::domain::{Aggregation, DataAccessError, Entity};

/// In-memory pending store.
///
/// Rows hold the current snapshots in insertion order; every event drained on
/// `save` or `delete` lands in the journal, oldest first. Cloning shares the
/// underlying storage, which is how tests keep a handle for inspection.
#[derive(Clone, Default)]
pub struct MemoryBookingRequestRepository {
    rows: Arc<RwLock<Vec<BookingRequest>>>,
    journal: Arc<RwLock<Vec<BookingRequestEvent>>>,
}

impl MemoryBookingRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn journal(&self) -> Vec<BookingRequestEvent> {
        self.journal.read().await.clone()
    }
}

#[async_trait]
impl BookingRequestRepository for MemoryBookingRequestRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<BookingRequest>, DataAccessError> {
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
    ) -> Result<Vec<BookingRequest>, DataAccessError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.resource_id() == resource_id)
            .cloned()
            .collect())
    }

    async fn save(&mut self, entity: &mut BookingRequest) -> Result<bool, DataAccessError> {
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

    async fn delete(&mut self, entity: &mut BookingRequest) -> Result<bool, DataAccessError> {
        self.journal.write().await.extend(entity.pop_all());
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id() != entity.id());
        Ok(rows.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::domain::core::{BookingStatus, Currency, Interval, Money, UserId};

    use super::*;

    fn request(requester: &str, millis: i64) -> BookingRequest {
        BookingRequest::submit(
            ResourceId::from("CAR1"),
            UserId::from(requester),
            requester.to_owned(),
            UserId::from("host-1"),
            Interval::new(
                "2024-03-01T00:00:00Z".parse().unwrap(),
                "2024-03-03T00:00:00Z".parse().unwrap(),
            )
            .unwrap(),
            Money::new(8000, Currency::JPY),
            vec![],
            Utc.timestamp_millis_opt(millis).single().unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_drains_events_and_upserts() {
        let mut repo = MemoryBookingRequestRepository::new();
        let mut req = request("guest-1", 1);

        assert!(repo.save(&mut req).await.unwrap());
        assert!(req.peek().is_none());
        // nothing new to persist
        assert!(!repo.save(&mut req).await.unwrap());

        let found = repo.find_by_id(&req.id()).await.unwrap().unwrap();
        assert_eq!(found, req);
        assert_eq!(repo.journal().await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let mut repo = MemoryBookingRequestRepository::new();
        let mut first = request("guest-1", 1);
        let mut second = request("guest-2", 2);
        repo.save(&mut first).await.unwrap();
        repo.save(&mut second).await.unwrap();

        let listed = repo
            .list_by_resource(&ResourceId::from("CAR1"))
            .await
            .unwrap();
        assert_eq!(listed, vec![first, second]);
        assert!(repo
            .list_by_resource(&ResourceId::from("CAR2"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_journals_the_resolution() {
        let mut repo = MemoryBookingRequestRepository::new();
        let mut req = request("guest-1", 1);
        repo.save(&mut req).await.unwrap();

        req.resolve(BookingStatus::Rejected).unwrap();
        assert!(repo.delete(&mut req).await.unwrap());
        assert!(repo.find_by_id(&req.id()).await.unwrap().is_none());
        assert!(matches!(
            repo.journal().await.last(),
            Some(BookingRequestEvent::Resolved { .. })
        ));
        // gone already
        assert!(!repo.delete(&mut req).await.unwrap());
    }
}
