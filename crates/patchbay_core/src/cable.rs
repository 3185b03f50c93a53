use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{PatchError, PatchResult};
use crate::plug::Plug;
use crate::types::{CableId, Direction, PlugId, SignalKind};

/// A cable the UI asked for. Endpoints may be given in either order; the
/// output end always becomes the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CableSpec {
    #[serde(default)]
    pub id: Option<CableId>,
    pub source: PlugId,
    pub dest: PlugId,
    pub kind: SignalKind,
}

impl CableSpec {
    pub fn new(source: impl Into<PlugId>, dest: impl Into<PlugId>, kind: SignalKind) -> Self {
        Self {
            id: None,
            source: source.into(),
            dest: dest.into(),
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<CableId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// An abstract edge from an output plug to an input plug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cable {
    pub id: CableId,
    pub source: PlugId,
    pub dest: PlugId,
    pub kind: SignalKind,
}

impl Cable {
    /// Check a requested cable against its two plugs.
    ///
    /// Plugs must have opposite directions and both carry the cable's kind.
    /// A kind mismatch is never coerced.
    pub(crate) fn validate(id: CableId, kind: SignalKind, a: &Plug, b: &Plug) -> PatchResult<Cable> {
        if b.direction() != a.direction().opposite() {
            return Err(PatchError::DirectionMismatch {
                cable: id,
                first: a.direction(),
                second: b.direction(),
            });
        }

        let (source, dest) = match a.direction() {
            Direction::Output => (a, b),
            Direction::Input => (b, a),
        };

        if source.kind() != kind || dest.kind() != kind {
            return Err(PatchError::KindMismatch {
                cable: id,
                cable_kind: kind,
                source_kind: source.kind(),
                dest_kind: dest.kind(),
            });
        }

        Ok(Cable {
            id,
            source: source.id().clone(),
            dest: dest.id().clone(),
            kind,
        })
    }
}
