//! Slot registry: named UI extension points and the plugin components
//! rendered into them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tokio::sync::RwLock;

use crate::context::PluginContext;

/// Order used when a component declaration omits one.
pub const DEFAULT_ORDER: i32 = 100;

// ─── Slot names ─────────────────────────────────────────────────────────

/// The closed set of UI slots the frontend renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UiSlot {
    SubmissionDetailSidebar,
    SubmissionDetailActions,
    SubmissionReviewPanel,
    ReviewFormExtra,
    EventDashboardWidgets,
    EventSettingsTabs,
    AdminDashboardWidgets,
    SpeakerProfileSection,
}

impl UiSlot {
    pub const ALL: &'static [UiSlot] = &[
        UiSlot::SubmissionDetailSidebar,
        UiSlot::SubmissionDetailActions,
        UiSlot::SubmissionReviewPanel,
        UiSlot::ReviewFormExtra,
        UiSlot::EventDashboardWidgets,
        UiSlot::EventSettingsTabs,
        UiSlot::AdminDashboardWidgets,
        UiSlot::SpeakerProfileSection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubmissionDetailSidebar => "submission-detail-sidebar",
            Self::SubmissionDetailActions => "submission-detail-actions",
            Self::SubmissionReviewPanel => "submission-review-panel",
            Self::ReviewFormExtra => "review-form-extra",
            Self::EventDashboardWidgets => "event-dashboard-widgets",
            Self::EventSettingsTabs => "event-settings-tabs",
            Self::AdminDashboardWidgets => "admin-dashboard-widgets",
            Self::SpeakerProfileSection => "speaker-profile-section",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.as_str()).collect()
    }
}

impl fmt::Display for UiSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UiSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ─── Registrations ──────────────────────────────────────────────────────

/// A request to place a component in a slot.
#[derive(Debug, Clone)]
pub struct SlotRegistration {
    pub slot: String,
    pub plugin_name: String,
    pub component: String,
    pub order: i32,
    pub context: Arc<PluginContext>,
}

/// A registered component, as handed to renderers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotComponent {
    pub slot: UiSlot,
    pub plugin_name: String,
    pub component: String,
    pub order: i32,
    #[serde(skip)]
    pub context: Arc<PluginContext>,
    #[serde(skip)]
    seq: u64,
}

#[derive(Debug, Default)]
struct SlotState {
    slots: HashMap<UiSlot, Vec<SlotComponent>>,
    next_seq: u64,
}

// ─── Registry ───────────────────────────────────────────────────────────

/// Slot name → components, each list kept sorted by `(order, insertion)`.
///
/// All readers get copies, so a registration landing mid-render never
/// disturbs a list already handed out.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    state: RwLock<SlotState>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component, or update the order of an existing
    /// `(slot, plugin, component)` entry. Unknown slots are rejected.
    pub async fn register(&self, registration: SlotRegistration) -> bool {
        let Some(slot) = UiSlot::parse(&registration.slot) else {
            tracing::warn!(
                plugin = %registration.plugin_name,
                slot = %registration.slot,
                "rejecting component for unknown slot"
            );
            return false;
        };

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let seq = state.next_seq;
        let entries = state.slots.entry(slot).or_default();

        let existing = entries.iter().position(|e| {
            e.plugin_name == registration.plugin_name && e.component == registration.component
        });
        match existing {
            Some(index) => {
                entries[index].order = registration.order;
                entries[index].context = registration.context;
            }
            None => {
                entries.push(SlotComponent {
                    slot,
                    plugin_name: registration.plugin_name,
                    component: registration.component,
                    order: registration.order,
                    context: registration.context,
                    seq,
                });
                state.next_seq += 1;
            }
        }
        entries.sort_by_key(|e| (e.order, e.seq));
        true
    }

    pub async fn unregister(&self, plugin_name: &str, slot: &str, component: &str) -> bool {
        let Some(slot) = UiSlot::parse(slot) else {
            return false;
        };
        let mut state = self.state.write().await;
        let Some(entries) = state.slots.get_mut(&slot) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| !(e.plugin_name == plugin_name && e.component == component));
        let removed = entries.len() != before;
        if entries.is_empty() {
            state.slots.remove(&slot);
        }
        removed
    }

    /// Remove every registration owned by `plugin_name`. Returns how many.
    pub async fn unregister_plugin(&self, plugin_name: &str) -> usize {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for entries in state.slots.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.plugin_name != plugin_name);
            removed += before - entries.len();
        }
        state.slots.retain(|_, entries| !entries.is_empty());
        if removed > 0 {
            tracing::debug!(plugin = %plugin_name, removed, "slot registrations removed");
        }
        removed
    }

    /// Ordered snapshot of a slot's components. Unknown slots are empty.
    pub async fn get_slot_components(&self, slot: &str) -> Vec<SlotComponent> {
        let Some(slot) = UiSlot::parse(slot) else {
            return Vec::new();
        };
        self.state
            .read()
            .await
            .slots
            .get(&slot)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_components(&self, slot: &str) -> bool {
        self.get_component_count(slot).await > 0
    }

    pub async fn get_component_count(&self, slot: &str) -> usize {
        let Some(slot) = UiSlot::parse(slot) else {
            return 0;
        };
        self.state
            .read()
            .await
            .slots
            .get(&slot)
            .map_or(0, Vec::len)
    }

    /// Slots with at least one component, in declaration order.
    pub async fn get_active_slots(&self) -> Vec<UiSlot> {
        let state = self.state.read().await;
        UiSlot::ALL
            .iter()
            .copied()
            .filter(|s| state.slots.get(s).is_some_and(|e| !e.is_empty()))
            .collect()
    }

    pub async fn get_plugin_registrations(&self, plugin_name: &str) -> Vec<SlotComponent> {
        let state = self.state.read().await;
        UiSlot::ALL
            .iter()
            .filter_map(|s| state.slots.get(s))
            .flatten()
            .filter(|e| e.plugin_name == plugin_name)
            .cloned()
            .collect()
    }

    pub async fn total_count(&self) -> usize {
        self.state.read().await.slots.values().map(Vec::len).sum()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.slots.clear();
        state.next_seq = 0;
    }
}
