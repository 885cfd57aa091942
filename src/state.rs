//! Saved source parameters, stored as JSON.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::{ListenMode, SourceParams, SourceShared, clamp_delay};

/// Phase control as saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Normal,
    Inverted,
}

impl From<bool> for Phase {
    fn from(inverted: bool) -> Self {
        if inverted {
            Phase::Inverted
        } else {
            Phase::Normal
        }
    }
}

impl From<Phase> for bool {
    fn from(phase: Phase) -> Self {
        phase == Phase::Inverted
    }
}

/// Everything restored when a source comes back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SavedState {
    pub delay: i32,
    pub invert_phase: Phase,
    pub listen_mode: ListenMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
}

impl SavedState {
    pub fn from_params(params: SourceParams, given_name: Option<String>) -> Self {
        Self {
            delay: params.delay,
            invert_phase: params.invert_phase.into(),
            listen_mode: params.listen_mode,
            given_name,
        }
    }

    pub fn capture(source: &SourceShared, given_name: Option<&str>) -> Self {
        Self::from_params(source.params(), given_name.map(str::to_string))
    }

    /// Parameters with the delay clamped into range.
    pub fn params(&self) -> SourceParams {
        SourceParams {
            delay: clamp_delay(self.delay),
            invert_phase: self.invert_phase.into(),
            listen_mode: self.listen_mode,
        }
    }

    pub fn apply(&self, source: &SourceShared) {
        source.set_params(self.params());
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
