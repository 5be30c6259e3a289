//! Ordered lifecycle pipeline
//!
//! Create runs Validate -> Stamp -> state machine -> uniqueness store.
//! Validation rejects bad input before anything is touched; stamping sees the
//! final validated payload; nothing is persisted until the state machine has
//! accepted every transition.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    AcceptAll, Clock, ProvisioningState, ProvisioningStateMachine, ResourceRecord, StateAdvancer,
    Stamper, SystemClock, TimestampStamper, Validator,
};
use crate::error::{EngineError, EngineResult};
use crate::scope::{ResourceTypeDescriptor, ScopeContext, ScopeKeyBuilder, ScopedEntry, UniquenessEngine};
use crate::store::ResourceStore;

/// How far `create` drives provisioning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningMode {
    /// Accepted -> Provisioning -> Succeeded inside `create`.
    #[default]
    Synchronous,
    /// Stop at Provisioning; the owner advances the resource later.
    Deferred,
}

/// Caller-supplied content of a create or update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceInput {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: Value,
}

impl ResourceInput {
    pub fn new(properties: Value) -> Self {
        Self {
            properties,
            ..Default::default()
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// A record together with its externally visible identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub identity: String,
    pub record: ResourceRecord,
}

pub struct ResourcePipeline {
    descriptor: ResourceTypeDescriptor,
    validator: Box<dyn Validator>,
    stamper: Box<dyn Stamper>,
    states: Box<dyn StateAdvancer>,
    uniqueness: UniquenessEngine,
    clock: Arc<dyn Clock>,
    mode: ProvisioningMode,
}

impl ResourcePipeline {
    /// Pipeline with no schema, audit stamping, history tracking and
    /// synchronous provisioning.
    pub fn new(descriptor: ResourceTypeDescriptor, store: Arc<dyn ResourceStore>) -> Self {
        let uniqueness = UniquenessEngine::new(ScopeKeyBuilder::new(descriptor.clone()), store);
        Self {
            descriptor,
            validator: Box::new(AcceptAll),
            stamper: Box::new(TimestampStamper),
            states: Box::new(ProvisioningStateMachine::default()),
            uniqueness,
            clock: Arc::new(SystemClock),
            mode: ProvisioningMode::Synchronous,
        }
    }

    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_stamper(mut self, stamper: impl Stamper + 'static) -> Self {
        self.stamper = Box::new(stamper);
        self
    }

    pub fn with_state_advancer(mut self, states: impl StateAdvancer + 'static) -> Self {
        self.states = Box::new(states);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mode(mut self, mode: ProvisioningMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn descriptor(&self) -> &ResourceTypeDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> ProvisioningMode {
        self.mode
    }

    pub fn identity(&self, name: &str, ctx: &ScopeContext) -> String {
        self.uniqueness.keys().identity(name, ctx)
    }

    fn decode(&self, entry: ScopedEntry) -> ResourceEntry {
        let record = match serde_json::from_value::<ResourceRecord>(entry.data.clone()) {
            Ok(record) => record,
            Err(_) => {
                // Legacy payloads predate lifecycle tracking.
                let name = entry
                    .identity
                    .rsplit('/')
                    .next()
                    .unwrap_or(&entry.identity)
                    .to_string();
                let mut record = ResourceRecord::new(name, self.descriptor.qualified_name());
                record.properties = entry.data;
                record.provisioning_state = ProvisioningState::Succeeded;
                record
            }
        };
        ResourceEntry {
            identity: entry.identity,
            record,
        }
    }

    async fn load(&self, name: &str, ctx: &ScopeContext) -> EngineResult<ResourceEntry> {
        match self.uniqueness.get(name, ctx).await? {
            Some(entry) => Ok(self.decode(entry)),
            None => Err(EngineError::not_found(self.identity(name, ctx))),
        }
    }

    async fn persist(&self, ctx: &ScopeContext, record: &ResourceRecord) -> EngineResult<ResourceEntry> {
        let entry = self
            .uniqueness
            .replace(&record.name, ctx, serde_json::to_value(record)?)
            .await?;
        Ok(ResourceEntry {
            identity: entry.identity,
            record: record.clone(),
        })
    }

    pub async fn create(
        &self,
        name: &str,
        input: ResourceInput,
        ctx: &ScopeContext,
    ) -> EngineResult<ResourceEntry> {
        if name.trim().is_empty() {
            return Err(EngineError::from_field_errors([("name", "is required")]));
        }
        self.validator.validate(&input.properties)?;

        let actor = ctx.actor_or_default();
        let now = self.clock.now();

        let mut record = ResourceRecord::new(name, self.descriptor.qualified_name());
        record.location = input.location;
        record.tags = input.tags;
        if !input.properties.is_null() {
            record.properties = input.properties;
        }
        self.stamper.stamp_create(&mut record, actor, now);

        self.states
            .advance(&mut record, ProvisioningState::Accepted, actor, now)?;
        self.states
            .advance(&mut record, ProvisioningState::Provisioning, actor, now)?;
        if self.mode == ProvisioningMode::Synchronous {
            self.states
                .advance(&mut record, ProvisioningState::Succeeded, actor, now)?;
        }

        let entry = self
            .uniqueness
            .create(name, serde_json::to_value(&record)?, ctx)
            .await?;

        tracing::info!(
            identity = %entry.identity,
            state = %record.provisioning_state,
            actor,
            "Created resource"
        );

        Ok(ResourceEntry {
            identity: entry.identity,
            record,
        })
    }

    /// Replace location, tags and properties of an existing resource.
    pub async fn update(
        &self,
        name: &str,
        input: ResourceInput,
        ctx: &ScopeContext,
    ) -> EngineResult<ResourceEntry> {
        self.validator.validate(&input.properties)?;

        let _guard = self.uniqueness.lock(name, ctx).await;
        let existing = self.load(name, ctx).await?;
        let mut record = existing.record.clone();
        if input.location.is_some() {
            record.location = input.location;
        }
        record.tags = input.tags;
        record.properties = if input.properties.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            input.properties
        };

        let actor = ctx.actor_or_default();
        self.stamper
            .stamp_update(&mut record, &existing.record, actor, self.clock.now());

        let entry = self.persist(ctx, &record).await?;
        tracing::info!(identity = %entry.identity, actor, "Updated resource");
        Ok(entry)
    }

    /// Create the resource, or update it when it already exists.
    pub async fn upsert(
        &self,
        name: &str,
        input: ResourceInput,
        ctx: &ScopeContext,
    ) -> EngineResult<ResourceEntry> {
        if self.uniqueness.get(name, ctx).await?.is_some() {
            self.update(name, input, ctx).await
        } else {
            self.create(name, input, ctx).await
        }
    }

    pub async fn advance_state(
        &self,
        name: &str,
        ctx: &ScopeContext,
        to: ProvisioningState,
    ) -> EngineResult<ResourceEntry> {
        let _guard = self.uniqueness.lock(name, ctx).await;
        let mut record = self.load(name, ctx).await?.record;
        self.states
            .advance(&mut record, to, ctx.actor_or_default(), self.clock.now())?;
        self.persist(ctx, &record).await
    }

    /// Drive the resource through Deleting -> Deleted and remove it.
    ///
    /// The returned entry carries the final `Deleted` record.
    pub async fn delete(&self, name: &str, ctx: &ScopeContext) -> EngineResult<ResourceEntry> {
        let _guard = self.uniqueness.lock(name, ctx).await;
        let mut record = self.load(name, ctx).await?.record;
        if record.provisioning_state == ProvisioningState::Deleted {
            return Err(EngineError::not_found(self.identity(name, ctx)));
        }

        let actor = ctx.actor_or_default();

        if record.provisioning_state != ProvisioningState::Deleting {
            self.states
                .advance(&mut record, ProvisioningState::Deleting, actor, self.clock.now())?;
            // Readers see Deleting while teardown is in progress.
            self.persist(ctx, &record).await?;
        }

        self.states
            .advance(&mut record, ProvisioningState::Deleted, actor, self.clock.now())?;

        let identity = self.identity(name, ctx);
        if !self.uniqueness.delete(name, ctx).await? {
            return Err(EngineError::not_found(identity));
        }

        tracing::info!(identity = %identity, actor, "Deleted resource");
        Ok(ResourceEntry { identity, record })
    }

    pub async fn get(&self, name: &str, ctx: &ScopeContext) -> EngineResult<Option<ResourceEntry>> {
        Ok(self
            .uniqueness
            .get(name, ctx)
            .await?
            .map(|entry| self.decode(entry)))
    }

    pub async fn list(&self, ctx: &ScopeContext) -> EngineResult<Vec<ResourceEntry>> {
        Ok(self
            .uniqueness
            .list(ctx)
            .await?
            .into_iter()
            .map(|entry| self.decode(entry))
            .collect())
    }
}
