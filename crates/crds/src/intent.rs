//! Member intent protocol.
//!
//! The controller and the agent running next to each Scylla member never talk
//! directly. They exchange [`Intent`] messages that are persisted as labels on
//! the member's identity Service (see [`crate::labels`]), and each side reads
//! them back on its own schedule.
//!
//! Delivery is at-least-once: both sides re-observe intents they already
//! applied, so [`apply`] reports [`Applied::AlreadyApplied`] instead of
//! writing again.
//!
//! Decommission and replace share one state machine:
//!
//! ```text
//! NotRequested --(controller: Request)--> Requested --(agent: Complete)--> Finished
//! Finished --(controller: Rerequest)--> Requested
//! ```
//!
//! Once a workflow is finished, only an explicit `Rerequest` moves it back. A
//! plain `Request` read from stale state leaves it finished.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProtocolViolation;
use crate::labels::{
    DECOMMISSION_LABEL, IP_LABEL, LABEL_VALUE_FALSE, LABEL_VALUE_TRUE, MAINTENANCE_LABEL,
    REPLACE_LABEL, SEED_LABEL,
};

/// Members designated as seeds at the start of every rack.
pub const SEEDS_PER_RACK: i32 = 2;

/// Progress of a decommission or replace workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    NotRequested,
    Requested,
    Finished,
}

impl Phase {
    /// Decodes a label value; any value other than `"true"` is a pending request.
    pub fn from_label(value: Option<&str>) -> Self {
        match value {
            None => Self::NotRequested,
            Some(LABEL_VALUE_TRUE) => Self::Finished,
            Some(_) => Self::Requested,
        }
    }

    /// Label value encoding this phase, `None` when the label is absent.
    pub fn label_value(self) -> Option<&'static str> {
        match self {
            Self::NotRequested => None,
            Self::Requested => Some(LABEL_VALUE_FALSE),
            Self::Finished => Some(LABEL_VALUE_TRUE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    Decommission,
    Replace,
}

impl Workflow {
    pub fn label(self) -> &'static str {
        match self {
            Self::Decommission => DECOMMISSION_LABEL,
            Self::Replace => REPLACE_LABEL,
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decommission => write!(f, "decommission"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// Who is writing an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Controller,
    Agent,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => write!(f, "controller"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// A single idempotent change to a member's coordination state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Controller: mark or unmark the member as a seed.
    Seed(bool),
    /// Controller or agent: record the member's address. Empty addresses are ignored.
    Address(String),
    /// Controller: put the member in or out of maintenance.
    Maintenance(bool),
    /// Controller: ask the agent to run a workflow. Leaves finished workflows alone.
    Request(Workflow),
    /// Controller: start a new request epoch, even over a finished workflow.
    Rerequest(Workflow),
    /// Agent: report a requested workflow as finished.
    Complete(Workflow),
}

/// Outcome of applying an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    AlreadyApplied,
}

/// An intent addressed to one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMessage {
    pub member: String,
    pub intent: Intent,
}

/// Decoded view of a member's intent labels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberIntents {
    pub seed: bool,
    pub address: Option<String>,
    pub decommission: Phase,
    pub replace: Phase,
    pub maintenance: bool,
}

impl MemberIntents {
    pub fn decode(labels: &BTreeMap<String, String>) -> Self {
        Self {
            seed: labels.get(SEED_LABEL).is_some_and(|v| v == LABEL_VALUE_TRUE),
            address: labels.get(IP_LABEL).filter(|v| !v.is_empty()).cloned(),
            decommission: Phase::from_label(labels.get(DECOMMISSION_LABEL).map(String::as_str)),
            replace: Phase::from_label(labels.get(REPLACE_LABEL).map(String::as_str)),
            maintenance: labels.contains_key(MAINTENANCE_LABEL),
        }
    }

    pub fn phase(&self, workflow: Workflow) -> Phase {
        match workflow {
            Workflow::Decommission => self.decommission,
            Workflow::Replace => self.replace,
        }
    }
}

/// Whether `ordinal` is a seed in a rack of `members`.
///
/// The first `min(2, members)` ordinals are seeds, so racks of one member
/// seed that member.
pub fn is_seed_ordinal(ordinal: i32, members: i32) -> bool {
    ordinal >= 0 && ordinal < members.min(SEEDS_PER_RACK)
}

/// Readiness reported for a member: maintenance overrides health.
pub fn effective_readiness(healthy: bool, labels: &BTreeMap<String, String>) -> bool {
    healthy && !labels.contains_key(MAINTENANCE_LABEL)
}

/// Applies `intent` written by `actor` to `labels`.
pub fn apply(
    labels: &mut BTreeMap<String, String>,
    actor: Actor,
    intent: &Intent,
) -> Result<Applied, ProtocolViolation> {
    match intent {
        Intent::Seed(seed) => {
            require_controller(actor, SEED_LABEL)?;
            Ok(set_flag(labels, SEED_LABEL, *seed, LABEL_VALUE_TRUE))
        }
        Intent::Maintenance(on) => {
            require_controller(actor, MAINTENANCE_LABEL)?;
            Ok(set_flag(labels, MAINTENANCE_LABEL, *on, ""))
        }
        Intent::Address(address) => {
            if address.is_empty() || labels.get(IP_LABEL) == Some(address) {
                return Ok(Applied::AlreadyApplied);
            }
            labels.insert(IP_LABEL.to_string(), address.clone());
            Ok(Applied::Changed)
        }
        Intent::Request(workflow) => {
            require_controller(actor, workflow.label())?;
            match current_phase(labels, *workflow) {
                Phase::NotRequested => Ok(set_phase(labels, *workflow, Phase::Requested)),
                Phase::Requested | Phase::Finished => Ok(Applied::AlreadyApplied),
            }
        }
        Intent::Rerequest(workflow) => {
            require_controller(actor, workflow.label())?;
            match current_phase(labels, *workflow) {
                Phase::Requested => Ok(Applied::AlreadyApplied),
                Phase::NotRequested | Phase::Finished => {
                    Ok(set_phase(labels, *workflow, Phase::Requested))
                }
            }
        }
        Intent::Complete(workflow) => {
            if actor != Actor::Agent {
                return Err(ProtocolViolation::NotOwner {
                    actor,
                    label: workflow.label(),
                });
            }
            match current_phase(labels, *workflow) {
                Phase::NotRequested => Err(ProtocolViolation::CompletionWithoutRequest {
                    workflow: *workflow,
                }),
                Phase::Requested => Ok(set_phase(labels, *workflow, Phase::Finished)),
                Phase::Finished => Ok(Applied::AlreadyApplied),
            }
        }
    }
}

/// Intents an agent still has to act on for `member`.
pub fn pending_intents(member: &str, labels: &BTreeMap<String, String>) -> Vec<IntentMessage> {
    let intents = MemberIntents::decode(labels);
    let mut pending = Vec::new();
    if intents.maintenance {
        pending.push(Intent::Maintenance(true));
    }
    for workflow in [Workflow::Decommission, Workflow::Replace] {
        if intents.phase(workflow) == Phase::Requested {
            pending.push(Intent::Request(workflow));
        }
    }
    pending
        .into_iter()
        .map(|intent| IntentMessage {
            member: member.to_string(),
            intent,
        })
        .collect()
}

/// Consumer of intents on the agent side.
///
/// Implementations see every pending intent on every delivery and must
/// treat an intent they are already working on, or already finished, as a
/// no-op.
pub trait IntentConsumer {
    type Error: From<ProtocolViolation>;

    /// Acts on `message`. Returns an intent to write back, typically
    /// `Intent::Complete` once the work is done, or `None` while in progress.
    fn handle(&mut self, message: &IntentMessage) -> Result<Option<Intent>, Self::Error>;
}

/// Delivers the pending intents of `member` to `consumer` and applies its replies.
///
/// Returns `true` when `labels` changed and need to be written back.
pub fn deliver<C: IntentConsumer>(
    consumer: &mut C,
    member: &str,
    labels: &mut BTreeMap<String, String>,
) -> Result<bool, C::Error> {
    let mut changed = false;
    for message in pending_intents(member, labels) {
        if let Some(reply) = consumer.handle(&message)? {
            changed |= apply(labels, Actor::Agent, &reply)? == Applied::Changed;
        }
    }
    Ok(changed)
}

fn require_controller(actor: Actor, label: &'static str) -> Result<(), ProtocolViolation> {
    match actor {
        Actor::Controller => Ok(()),
        Actor::Agent => Err(ProtocolViolation::NotOwner { actor, label }),
    }
}

fn current_phase(labels: &BTreeMap<String, String>, workflow: Workflow) -> Phase {
    Phase::from_label(labels.get(workflow.label()).map(String::as_str))
}

fn set_phase(labels: &mut BTreeMap<String, String>, workflow: Workflow, phase: Phase) -> Applied {
    match phase.label_value() {
        Some(value) => labels.insert(workflow.label().to_string(), value.to_string()),
        None => labels.remove(workflow.label()),
    };
    Applied::Changed
}

fn set_flag(labels: &mut BTreeMap<String, String>, key: &str, on: bool, value: &str) -> Applied {
    match (on, labels.get(key)) {
        (true, Some(current)) if current == value => Applied::AlreadyApplied,
        (false, None) => Applied::AlreadyApplied,
        (true, _) => {
            labels.insert(key.to_string(), value.to_string());
            Applied::Changed
        }
        (false, Some(_)) => {
            labels.remove(key);
            Applied::Changed
        }
    }
}

#[cfg(test)]
#[path = "intent_test.rs"]
mod intent_test;
