//! The processing-unit contract.
//!
//! A processing unit is the live audio object a window wraps. The core never
//! looks inside one; it only asks it to connect, disconnect and change
//! parameters. Units must tolerate redundant calls: disconnecting a pair that
//! is not connected is a no-op, not an error.

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::UnitError;
use crate::types::SignalKind;

/// Which output of the source unit feeds which input of the destination.
///
/// Indices are positions of the cable's plugs within their nodes' output and
/// input lists, matching the `output`/`input` arguments of a web audio
/// `connect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub output: u32,
    pub input: u32,
    pub kind: SignalKind,
}

/// One automatable parameter as reported by a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParamInfo {
    pub id: String,
    pub min: f64,
    pub max: f64,
    pub value: f64,
}

pub trait ProcessingUnit: Send + Sync {
    /// Short human readable name, used in logs.
    fn label(&self) -> &str;

    fn connect(&self, other: &dyn ProcessingUnit, route: Route) -> Result<(), UnitError>;

    fn disconnect(&self, other: &dyn ProcessingUnit, route: Route) -> Result<(), UnitError>;

    fn parameters(&self) -> Vec<ParamInfo> {
        Vec::new()
    }

    fn set_parameter(&self, _id: &str, _value: f64) -> Result<(), UnitError> {
        Err(UnitError::Unsupported)
    }
}

pub type SharedUnit = Arc<dyn ProcessingUnit>;

/// A call observed by a [`RecordingUnit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UnitCall {
    Connect {
        from: String,
        to: String,
        route: Route,
    },
    Disconnect {
        from: String,
        to: String,
        route: Route,
    },
    SetParam {
        unit: String,
        param: String,
        value: f64,
    },
}

impl UnitCall {
    pub fn is_connect(&self) -> bool {
        matches!(self, UnitCall::Connect { .. })
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, UnitCall::Disconnect { .. })
    }
}

/// Shared, append-only log of unit calls. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct UnitLog(Arc<Mutex<Vec<UnitCall>>>);

impl UnitLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: UnitCall) {
        self.0.lock().push(call);
    }

    pub fn snapshot(&self) -> Vec<UnitCall> {
        self.0.lock().clone()
    }

    /// Remove and return everything logged so far.
    pub fn take(&self) -> Vec<UnitCall> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn connects(&self) -> usize {
        self.0.lock().iter().filter(|c| c.is_connect()).count()
    }

    pub fn disconnects(&self) -> usize {
        self.0.lock().iter().filter(|c| c.is_disconnect()).count()
    }
}

/// A unit that does nothing but record what it was asked to do.
///
/// Used for dry runs and tests. Failures can be injected to exercise the
/// warn-and-continue teardown path.
pub struct RecordingUnit {
    label: String,
    log: UnitLog,
    params: Mutex<Vec<ParamInfo>>,
    fail_connect: bool,
    fail_disconnect: bool,
}

impl RecordingUnit {
    pub fn new(label: impl Into<String>, log: &UnitLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            params: Mutex::new(Vec::new()),
            fail_connect: false,
            fail_disconnect: false,
        }
    }

    pub fn with_params(self, params: Vec<ParamInfo>) -> Self {
        *self.params.lock() = params;
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn shared(self) -> SharedUnit {
        Arc::new(self)
    }
}

impl ProcessingUnit for RecordingUnit {
    fn label(&self) -> &str {
        &self.label
    }

    fn connect(&self, other: &dyn ProcessingUnit, route: Route) -> Result<(), UnitError> {
        if self.fail_connect {
            return Err(UnitError::Rejected(format!("{} refuses connections", self.label)));
        }
        self.log.push(UnitCall::Connect {
            from: self.label.clone(),
            to: other.label().to_string(),
            route,
        });
        Ok(())
    }

    fn disconnect(&self, other: &dyn ProcessingUnit, route: Route) -> Result<(), UnitError> {
        self.log.push(UnitCall::Disconnect {
            from: self.label.clone(),
            to: other.label().to_string(),
            route,
        });
        if self.fail_disconnect {
            return Err(UnitError::Rejected(format!("{} cannot disconnect", self.label)));
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<ParamInfo> {
        self.params.lock().clone()
    }

    fn set_parameter(&self, id: &str, value: f64) -> Result<(), UnitError> {
        let mut params = self.params.lock();
        let Some(param) = params.iter_mut().find(|p| p.id == id) else {
            return Err(UnitError::Rejected(format!("no parameter '{}'", id)));
        };
        param.value = value;
        self.log.push(UnitCall::SetParam {
            unit: self.label.clone(),
            param: id.to_string(),
            value,
        });
        Ok(())
    }
}
