//! Error types for patch operations.
//!
//! Only user actions (drawing a cable, adding a window, turning a knob)
//! return these. Reconciliation and teardown log failures and carry on.

use thiserror::Error;

use crate::types::{CableId, Direction, NodeId, PlugId, PresetId, SignalKind};

/// Failure reported by a processing unit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("unit rejected the call: {0}")]
    Rejected(String),

    #[error("operation not supported by this unit")]
    Unsupported,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("node not found: {0}")]
    UnknownNode(NodeId),

    #[error("node already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("plug not found: {0}")]
    UnknownPlug(PlugId),

    #[error("plug already exists: {0}")]
    DuplicatePlug(PlugId),

    #[error("cable {0} already exists with different endpoints")]
    DuplicateCable(CableId),

    #[error("plugs {source_plug} and {dest_plug} are already connected by cable {existing}")]
    AlreadyConnected {
        existing: CableId,
        source_plug: PlugId,
        dest_plug: PlugId,
    },

    #[error("cable {cable} carries {cable_kind} but its plugs carry {source_kind} and {dest_kind}")]
    KindMismatch {
        cable: CableId,
        cable_kind: SignalKind,
        source_kind: SignalKind,
        dest_kind: SignalKind,
    },

    #[error("cable {cable} must join an output and an input, got {first} and {second}")]
    DirectionMismatch {
        cable: CableId,
        first: Direction,
        second: Direction,
    },

    #[error("processing unit behind cable {cable} was dropped before teardown")]
    UnitDropped { cable: CableId },

    #[error("processing unit failed on cable {cable}: {source}")]
    Unit {
        cable: CableId,
        #[source]
        source: UnitError,
    },

    #[error("processing unit on node {node} failed: {source}")]
    NodeUnit {
        node: NodeId,
        #[source]
        source: UnitError,
    },

    #[error("node {0} has no processing unit yet")]
    NoUnit(NodeId),

    #[error("node {node} has no parameter '{param}'")]
    UnknownParam { node: NodeId, param: String },

    #[error("preset detail is incomplete, unset: {}", missing.join(", "))]
    PresetIncomplete { missing: Vec<String> },

    #[error("preset not found: {0}")]
    UnknownPreset(PresetId),
}

pub type PatchResult<T> = Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PatchError::KindMismatch {
            cable: "c1".into(),
            cable_kind: SignalKind::Audio,
            source_kind: SignalKind::Audio,
            dest_kind: SignalKind::Control,
        };
        assert_eq!(
            err.to_string(),
            "cable c1 carries audio but its plugs carry audio and control"
        );

        let err = PatchError::PresetIncomplete {
            missing: vec!["cutoff".into(), "res".into()],
        };
        assert_eq!(err.to_string(), "preset detail is incomplete, unset: cutoff, res");
    }

    #[test]
    fn test_unit_error_is_source() {
        use std::error::Error as _;
        let err = PatchError::Unit {
            cable: "c1".into(),
            source: UnitError::Rejected("busy".into()),
        };
        assert!(err.source().is_some());
    }
}
