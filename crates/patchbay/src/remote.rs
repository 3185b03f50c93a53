//! Processing units that live on the JS side.
//!
//! The audio nodes themselves belong to the browser. Here a unit is only a
//! handle; every physical call is queued as a [`UnitCommand`] which the UI
//! drains and replays against its audio nodes.

use std::sync::Arc;

use napi_derive::napi;
use parking_lot::Mutex;
use patchbay_core::{ParamInfo, ProcessingUnit, Route, UnitError};

/// A physical operation the UI must apply to its audio nodes.
#[napi(object)]
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCommand {
  /// "connect", "disconnect" or "setParam"
  pub op: String,
  pub from: String,
  pub to: Option<String>,
  pub output: Option<u32>,
  pub input: Option<u32>,
  pub param: Option<String>,
  pub value: Option<f64>,
}

impl UnitCommand {
  fn route(op: &str, from: &str, to: &str, route: Route) -> Self {
    Self {
      op: op.to_string(),
      from: from.to_string(),
      to: Some(to.to_string()),
      output: Some(route.output),
      input: Some(route.input),
      param: None,
      value: None,
    }
  }
}

pub type CommandQueue = Arc<Mutex<Vec<UnitCommand>>>;

pub struct RemoteUnit {
  handle: String,
  params: Mutex<Vec<ParamInfo>>,
  queue: CommandQueue,
}

impl RemoteUnit {
  pub fn new(handle: String, params: Vec<ParamInfo>, queue: &CommandQueue) -> Self {
    Self {
      handle,
      params: Mutex::new(params),
      queue: Arc::clone(queue),
    }
  }
}

impl ProcessingUnit for RemoteUnit {
  fn label(&self) -> &str {
    &self.handle
  }

  fn connect(&self, other: &dyn ProcessingUnit, route: Route) -> Result<(), UnitError> {
    self
      .queue
      .lock()
      .push(UnitCommand::route("connect", &self.handle, other.label(), route));
    Ok(())
  }

  fn disconnect(&self, other: &dyn ProcessingUnit, route: Route) -> Result<(), UnitError> {
    self
      .queue
      .lock()
      .push(UnitCommand::route("disconnect", &self.handle, other.label(), route));
    Ok(())
  }

  fn parameters(&self) -> Vec<ParamInfo> {
    self.params.lock().clone()
  }

  fn set_parameter(&self, id: &str, value: f64) -> Result<(), UnitError> {
    let mut params = self.params.lock();
    let param = params
      .iter_mut()
      .find(|p| p.id == id)
      .ok_or_else(|| UnitError::Rejected(format!("{} has no parameter '{}'", self.handle, id)))?;
    param.value = value;
    self.queue.lock().push(UnitCommand {
      op: "setParam".to_string(),
      from: self.handle.clone(),
      to: None,
      output: None,
      input: None,
      param: Some(id.to_string()),
      value: Some(value),
    });
    Ok(())
  }
}
