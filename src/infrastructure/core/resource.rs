use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::core::{ResourceId, ResourceState, ResourceStateRepository};
use crate::domain::{DataAccessError, Entity};

/// In-memory occupancy cache. Plain key-value rows; the cache is rebuilt from
/// the archive on loss, so there is no journal to keep.
#[derive(Clone, Default)]
pub struct MemoryResourceStateRepository {
    rows: Arc<RwLock<Vec<ResourceState>>>,
}

impl MemoryResourceStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStateRepository for MemoryResourceStateRepository {
    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<ResourceState>, DataAccessError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|r| r.id() == *id)
            .cloned())
    }

    async fn save(&mut self, entity: &mut ResourceState) -> Result<bool, DataAccessError> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.id() == entity.id()) {
            Some(row) => *row = entity.clone(),
            None => rows.push(entity.clone()),
        }
        Ok(true)
    }
}
