//! Provisioning state machine
//!
//! ```text
//! NotStarted -> Accepted -> Provisioning -> Succeeded -> Deleting -> Deleted
//!                  |             |                          ^
//!                  v             v                          |
//!                Failed <--------+--------------------------+
//!                  |
//!                  +-> Accepted (retry)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ResourceRecord, StateAdvancer, StateTransition};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningState {
    NotStarted,
    Accepted,
    Provisioning,
    Succeeded,
    Failed,
    Deleting,
    Deleted,
}

impl ProvisioningState {
    pub const ALL: [ProvisioningState; 7] = [
        Self::NotStarted,
        Self::Accepted,
        Self::Provisioning,
        Self::Succeeded,
        Self::Failed,
        Self::Deleting,
        Self::Deleted,
    ];

    pub fn allowed_transitions(self) -> &'static [ProvisioningState] {
        match self {
            Self::NotStarted => &[Self::Accepted],
            Self::Accepted => &[Self::Provisioning, Self::Failed],
            Self::Provisioning => &[Self::Succeeded, Self::Failed],
            Self::Succeeded => &[Self::Deleting],
            Self::Failed => &[Self::Deleting, Self::Accepted],
            Self::Deleting => &[Self::Deleted],
            Self::Deleted => &[],
        }
    }

    pub fn can_transition_to(self, next: ProvisioningState) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Accepted => "Accepted",
            Self::Provisioning => "Provisioning",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
        }
    }

    /// Case-insensitive parse of a state name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates transitions against the graph above and applies them.
#[derive(Debug, Clone)]
pub struct ProvisioningStateMachine {
    track_history: bool,
}

impl Default for ProvisioningStateMachine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ProvisioningStateMachine {
    pub fn new(track_history: bool) -> Self {
        Self { track_history }
    }
}

impl StateAdvancer for ProvisioningStateMachine {
    fn advance(
        &self,
        record: &mut ResourceRecord,
        to: ProvisioningState,
        actor: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let from = record.provisioning_state;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }

        tracing::debug!(resource = %record.name, %from, %to, "Provisioning state transition");

        record.provisioning_state = to;
        record.system_data.modified_time = Some(now);
        record.system_data.modified_by = Some(actor.to_string());
        if self.track_history {
            record.history.push(StateTransition {
                state: to,
                timestamp: now,
            });
        }
        Ok(())
    }
}
