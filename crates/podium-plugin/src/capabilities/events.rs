use std::sync::Arc;

use uuid::Uuid;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::permissions::Permission;
use crate::store::{Event, EventFilter, EventStore, EventUnique, FindMany};

pub struct EventsCapability {
    scope: Arc<CapabilityScope>,
    store: Arc<EventStore>,
}

impl EventsCapability {
    pub fn new(scope: Arc<CapabilityScope>, store: Arc<EventStore>) -> Self {
        Self { scope, store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Event>, PluginError> {
        self.scope.require(Permission::EventsRead)?;
        self.store.find_unique(&EventUnique::Id(id)).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Event>, PluginError> {
        self.scope.require(Permission::EventsRead)?;
        self.store
            .find_unique(&EventUnique::Slug(slug.to_string()))
            .await
    }

    pub async fn list(&self, filter: EventFilter) -> Result<Vec<Event>, PluginError> {
        self.scope.require(Permission::EventsRead)?;
        self.store.find_many(FindMany::new(filter)).await
    }
}
