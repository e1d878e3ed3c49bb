//! Scenario definitions
//!
//! A scenario is a named, ordered script of the exchanges a reader is expected
//! to perform. It is created and edited outside the engine, which only reads
//! validated copies of it.

use std::collections::HashSet;

use nfcemu_apdu::hex::{normalize_aid, parse_hex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A named script of expected exchanges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Unique, non-empty name
    pub name: String,
    /// Application identifier the scenario is filed under
    ///
    /// Descriptive only: the engine runs [`Self::steps`] as stored, so a
    /// scenario that needs a select carries its own `Select` step.
    #[serde(default)]
    pub aid: String,
    /// Carried with the scenario for controllers; one-shot selects are set per
    /// step with `singleSelect`
    #[serde(default)]
    pub select_once: bool,
    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One step of a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StepRecord", into = "StepRecord")]
pub struct Step {
    /// Name, unique within the scenario
    pub name: String,
    /// What the step matches
    pub kind: StepKind,
}

/// What a step matches and answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Matches a `SELECT` by-name for `aid`
    Select {
        /// AID in hex
        aid: String,
        /// Consume the AID once selected, ignoring repeated selects
        single_select: bool,
    },
    /// Matches a literal command and answers with a literal response
    RequestResponse {
        /// Expected command, hex
        request: String,
        /// Response to send, hex
        response: String,
        /// Selection state the command must arrive in
        needs_selection: bool,
    },
}

impl Step {
    /// Create a select step
    pub fn select(name: impl Into<String>, aid: impl Into<String>, single_select: bool) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Select {
                aid: aid.into(),
                single_select,
            },
        }
    }

    /// Create a request/response step
    pub fn exchange(
        name: impl Into<String>,
        request: impl Into<String>,
        response: impl Into<String>,
        needs_selection: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::RequestResponse {
                request: request.into(),
                response: response.into(),
                needs_selection,
            },
        }
    }

    fn normalized(&self) -> Result<Self> {
        let kind = match &self.kind {
            StepKind::Select { aid, single_select } => StepKind::Select {
                aid: normalize_aid(aid)?,
                single_select: *single_select,
            },
            StepKind::RequestResponse {
                request,
                response,
                needs_selection,
            } => {
                let request_bytes = parse_hex(request)?;
                if request_bytes.is_empty() {
                    return Err(nfcemu_apdu::Error::invalid_hex(request.as_str(), "empty request")
                        .with_context(format!("step {:?}", self.name))
                        .into());
                }
                let response_bytes = parse_hex(response)?;
                StepKind::RequestResponse {
                    request: nfcemu_apdu::hex::encode_upper(&request_bytes),
                    response: nfcemu_apdu::hex::encode_upper(&response_bytes),
                    needs_selection: *needs_selection,
                }
            }
        };
        Ok(Self {
            name: self.name.trim().to_string(),
            kind,
        })
    }
}

impl Scenario {
    /// Create an empty scenario
    pub fn new(name: impl Into<String>, aid: impl Into<String>, select_once: bool) -> Self {
        Self {
            name: name.into(),
            aid: aid.into(),
            select_once,
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Check the scenario and return its canonical form
    ///
    /// Names are trimmed, AIDs and hex payloads uppercased. Steps with a blank
    /// name or a name already used earlier in the list are dropped; the first
    /// occurrence wins.
    pub fn validated(&self) -> Result<Self> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_scenario(&self.name, "name is empty"));
        }

        let aid = match self.aid.trim() {
            "" => String::new(),
            aid => normalize_aid(aid)
                .map_err(|e| Error::invalid_scenario(name, e.to_string()))?,
        };

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let step_name = step.name.trim();
            if step_name.is_empty() || !seen.insert(step_name.to_string()) {
                debug!(scenario = name, step = step_name, "Dropping unnamed or duplicate step");
                continue;
            }
            steps.push(
                step.normalized()
                    .map_err(|e| Error::invalid_scenario(name, e.to_string()))?,
            );
        }

        Ok(Self {
            name: name.to_string(),
            aid,
            select_once: self.select_once,
            steps,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum StepType {
    Select,
    #[default]
    RequestResponse,
}

/// Flat wire form of a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepRecord {
    name: String,
    #[serde(rename = "type", default)]
    step_type: StepType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    aid: String,
    #[serde(default)]
    single_select: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    request: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    response: String,
    #[serde(default = "default_needs_selection")]
    needs_selection: bool,
}

const fn default_needs_selection() -> bool {
    true
}

impl From<StepRecord> for Step {
    fn from(record: StepRecord) -> Self {
        match record.step_type {
            StepType::Select => Self::select(record.name, record.aid, record.single_select),
            StepType::RequestResponse => Self::exchange(
                record.name,
                record.request,
                record.response,
                record.needs_selection,
            ),
        }
    }
}

impl From<Step> for StepRecord {
    fn from(step: Step) -> Self {
        match step.kind {
            StepKind::Select { aid, single_select } => Self {
                name: step.name,
                step_type: StepType::Select,
                aid,
                single_select,
                request: String::new(),
                response: String::new(),
                needs_selection: false,
            },
            StepKind::RequestResponse {
                request,
                response,
                needs_selection,
            } => Self {
                name: step.name,
                step_type: StepType::RequestResponse,
                aid: String::new(),
                single_select: false,
                request,
                response,
                needs_selection,
            },
        }
    }
}
