//! Resource lifecycle
//!
//! Cross-cutting handlers are small traits composed into an explicit pipeline
//! by [`ResourcePipeline`]:
//!
//! ```text
//! Validator -> Stamper -> StateAdvancer (create) -> UniquenessEngine (store)
//! ```
//!
//! - [`state`] - provisioning states and the transition graph
//! - [`timestamp`] - created/modified audit stamping
//! - [`validation`] - declarative payload schemas
//! - [`pipeline`] - the ordered composition

pub mod pipeline;
pub mod state;
pub mod timestamp;
pub mod validation;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineResult;

pub use pipeline::{ProvisioningMode, ResourceEntry, ResourceInput, ResourcePipeline};
pub use state::{ProvisioningState, ProvisioningStateMachine};
pub use timestamp::TimestampStamper;
pub use validation::{FieldKind, FieldRule, ResourceSchema, SchemaValidator};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: ProvisioningState,
    pub timestamp: DateTime<Utc>,
}

/// Stored payload of a scoped resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: Value,
    pub provisioning_state: ProvisioningState,
    #[serde(flatten)]
    pub system_data: SystemData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<StateTransition>,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            location: None,
            tags: BTreeMap::new(),
            properties: Value::Object(serde_json::Map::new()),
            provisioning_state: ProvisioningState::NotStarted,
            system_data: SystemData::default(),
            history: Vec::new(),
        }
    }
}

// =============================================================================
// Cross-cutting handler seams
// =============================================================================

/// Rejects bad payloads before any side effect.
pub trait Validator: Send + Sync {
    fn validate(&self, payload: &Value) -> EngineResult<()>;
}

/// Accepts every payload. Used by types without a schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _payload: &Value) -> EngineResult<()> {
        Ok(())
    }
}

/// Writes audit metadata onto records.
pub trait Stamper: Send + Sync {
    fn stamp_create(&self, record: &mut ResourceRecord, actor: &str, now: DateTime<Utc>);

    fn stamp_update(
        &self,
        record: &mut ResourceRecord,
        existing: &ResourceRecord,
        actor: &str,
        now: DateTime<Utc>,
    );
}

/// Moves a record between provisioning states. Must leave the record
/// untouched when the transition is rejected.
pub trait StateAdvancer: Send + Sync {
    fn advance(
        &self,
        record: &mut ResourceRecord,
        to: ProvisioningState,
        actor: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that moves forward by a fixed step on every read.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
    step_micros: i64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            micros: AtomicI64::new(start.timestamp_micros()),
            step_micros: step.num_microseconds().unwrap_or(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.num_microseconds().unwrap_or(0), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.micros.fetch_add(self.step_micros, Ordering::SeqCst);
        DateTime::from_timestamp_micros(micros).unwrap_or_default()
    }
}
