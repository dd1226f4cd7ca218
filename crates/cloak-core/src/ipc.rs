use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::process::ProcessInspector;
use crate::visibility::{InjectionBackend, VisibilityController};
use crate::{CloakResult, log_info};

/// A command sent by the GUI collaborator to the visibility controller.
///
/// Serialized as one JSON object per line, tagged by `command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Hide (or show) every process matching one name.
    #[serde(rename_all = "camelCase")]
    HideProcessWindows { process_name: String, hide: bool },
    /// Same as `HideProcessWindows` for several names, results summed.
    HideMultipleProcesses { processes: Vec<String>, hide: bool },
    /// List the names currently hidden.
    GetHiddenProcesses,
    /// Show everything that was hidden and forget all state.
    RestoreAll,
    /// Ask whether one name is currently hidden.
    #[serde(rename_all = "camelCase")]
    IsProcessHidden { process_name: String },
}

/// A response sent back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the command succeeded.
    pub status: ResponseStatus,
    /// Optional human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific result value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Status of a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

impl Response {
    /// Creates a successful response with no message.
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
            data: None,
        }
    }

    /// Creates a successful response carrying a result value.
    pub fn ok_with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl Command {
    /// Parses one line of the wire format.
    pub fn parse(line: &str) -> CloakResult<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

/// Executes a command against the controller.
///
/// Never fails: an uninitialized controller or an unmatched process is
/// reported as a count of 0 or `false`, like the controller itself.
pub fn handle_command<B>(command: &Command, controller: &mut VisibilityController<B>) -> Response
where
    B: ProcessInspector + InjectionBackend,
{
    match command {
        Command::HideProcessWindows { process_name, hide } => {
            log_info!("hideProcessWindows({process_name}, {hide})");
            let affected = controller.hide_process_windows(process_name, *hide);
            Response::ok_with_data(json!(affected))
        }
        Command::HideMultipleProcesses { processes, hide } => {
            log_info!("hideMultipleProcesses({processes:?}, {hide})");
            let affected = controller.hide_multiple_processes(processes.as_slice(), *hide);
            Response::ok_with_data(json!(affected))
        }
        Command::GetHiddenProcesses => {
            Response::ok_with_data(json!(controller.hidden_processes()))
        }
        Command::RestoreAll => {
            log_info!("restoreAll()");
            controller.restore_all();
            Response::ok()
        }
        Command::IsProcessHidden { process_name } => {
            Response::ok_with_data(json!(controller.is_process_hidden(process_name)))
        }
    }
}
