use std::sync::Arc;

use uuid::Uuid;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::permissions::Permission;
use crate::store::{FindMany, NewReview, Review, ReviewFilter, ReviewStore, ReviewUpdate};

pub struct ReviewsCapability {
    scope: Arc<CapabilityScope>,
    store: Arc<ReviewStore>,
}

impl std::fmt::Debug for ReviewsCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewsCapability")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ReviewsCapability {
    pub fn new(scope: Arc<CapabilityScope>, store: Arc<ReviewStore>) -> Self {
        Self { scope, store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Review>, PluginError> {
        self.scope.require(Permission::ReviewsRead)?;
        self.store.find_unique(&id).await
    }

    pub async fn list(&self, filter: ReviewFilter) -> Result<Vec<Review>, PluginError> {
        self.scope.require(Permission::ReviewsRead)?;
        self.store.find_many(FindMany::new(filter)).await
    }

    pub async fn create(&self, data: NewReview) -> Result<Review, PluginError> {
        self.scope.require(Permission::ReviewsWrite)?;
        let created = self.store.create(data).await?;
        self.scope.audit("review.create", &created.id.to_string());
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, data: ReviewUpdate) -> Result<Option<Review>, PluginError> {
        self.scope.require(Permission::ReviewsWrite)?;
        let updated = self.store.update(&id, data).await?;
        if updated.is_some() {
            self.scope.audit("review.update", &id.to_string());
        }
        Ok(updated)
    }
}
