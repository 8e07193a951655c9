//! # Event payloads.
//!
//! Each [`EventKind`](super::EventKind) carries exactly one payload struct,
//! serialized as camelCase JSON in the `data:` field of the stream. Payloads
//! only reference other entities by id (`groupId`, `operationId`, ...).

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Normalized component state.
///
/// The closed set is `running | exited | paused | restarting`. Runtime actions
/// outside the normalization table are carried verbatim in [`ComponentState::Other`]
/// and serialize as the raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Running,
    Exited,
    Paused,
    Restarting,
    Other(String),
}

impl ComponentState {
    /// Maps a raw runtime action (`start`, `die`, ...) to a state.
    ///
    /// # Example
    /// ```
    /// use gosei::events::ComponentState;
    ///
    /// assert_eq!(ComponentState::from_action("die"), ComponentState::Exited);
    /// assert_eq!(ComponentState::from_action("unpause"), ComponentState::Running);
    /// assert_eq!(ComponentState::from_action("oom").as_str(), "oom");
    /// ```
    pub fn from_action(action: &str) -> Self {
        match action {
            "start" | "unpause" => ComponentState::Running,
            "stop" | "die" | "kill" => ComponentState::Exited,
            "pause" => ComponentState::Paused,
            "restart" => ComponentState::Restarting,
            other => ComponentState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ComponentState::Running => "running",
            ComponentState::Exited => "exited",
            ComponentState::Paused => "paused",
            ComponentState::Restarting => "restarting",
            ComponentState::Other(raw) => raw,
        }
    }

    /// True only for states inside the closed set.
    pub fn is_known(&self) -> bool {
        !matches!(self, ComponentState::Other(_))
    }
}

impl Serialize for ComponentState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Aggregate status of a group.
///
/// `Unknown` means the member query failed; it is never derived from counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Running,
    Partial,
    Stopped,
    Unknown,
}

impl GroupState {
    /// Derives the state from member counts.
    ///
    /// - `running == 0` → `Stopped`
    /// - `running == total` → `Running`
    /// - otherwise → `Partial`
    pub fn from_counts(running: usize, total: usize) -> Self {
        if running == 0 {
            GroupState::Stopped
        } else if running == total {
            GroupState::Running
        } else {
            GroupState::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Running => "running",
            GroupState::Partial => "partial",
            GroupState::Stopped => "stopped",
            GroupState::Unknown => "unknown",
        }
    }
}

/// Which pipe an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// `connected` handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub client_id: String,
}

/// `component:status`: one normalized runtime event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub id: String,
    pub name: String,
    /// Raw runtime action.
    pub action: String,
    pub state: ComponentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// `group:status`: the aggregate record after a reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    pub group_id: String,
    pub status: GroupState,
    pub running: usize,
    pub total: usize,
    pub last_updated: DateTime<Utc>,
}

/// `operation:output`: one line produced by a running action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutput {
    pub operation_id: String,
    pub group_id: String,
    pub operation: String,
    pub line: String,
    pub stream: OutputStream,
}

/// `operation:complete`: the single terminal record of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationComplete {
    pub operation_id: String,
    pub group_id: String,
    pub operation: String,
    pub success: bool,
    pub message: String,
}

/// `log`: one line of a followed component log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub component_id: String,
    pub component: String,
    pub line: String,
    pub stream: OutputStream,
    pub timestamp: DateTime<Utc>,
}

/// `component:stats`: point-in-time resource usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStats {
    pub id: String,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

/// Body of an [`Event`](super::Event); serialized without a wrapper tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Connected(Connected),
    ComponentStatus(ComponentStatus),
    GroupStatus(GroupStatus),
    OperationOutput(OperationOutput),
    OperationComplete(OperationComplete),
    Log(LogLine),
    ComponentStats(ComponentStats),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_table() {
        let cases = [
            ("start", ComponentState::Running),
            ("stop", ComponentState::Exited),
            ("die", ComponentState::Exited),
            ("kill", ComponentState::Exited),
            ("pause", ComponentState::Paused),
            ("unpause", ComponentState::Running),
            ("restart", ComponentState::Restarting),
        ];
        for (action, expected) in cases {
            assert_eq!(ComponentState::from_action(action), expected, "{action}");
            assert!(ComponentState::from_action(action).is_known());
        }
    }

    #[test]
    fn unmapped_action_passes_through_verbatim() {
        let state = ComponentState::from_action("health_status: healthy");
        assert!(!state.is_known());
        assert_eq!(state.as_str(), "health_status: healthy");
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            "\"health_status: healthy\""
        );
    }

    #[test]
    fn group_state_from_counts() {
        assert_eq!(GroupState::from_counts(3, 5), GroupState::Partial);
        assert_eq!(GroupState::from_counts(0, 4), GroupState::Stopped);
        assert_eq!(GroupState::from_counts(4, 4), GroupState::Running);
        assert_eq!(GroupState::from_counts(0, 0), GroupState::Stopped);
    }

    #[test]
    fn payload_serializes_camel_case_without_tag() {
        let payload = Payload::OperationComplete(OperationComplete {
            operation_id: "op-1".into(),
            group_id: "webapp".into(),
            operation: "update".into(),
            success: false,
            message: "pull failed".into(),
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["operationId"], "op-1");
        assert_eq!(json["groupId"], "webapp");
        assert_eq!(json["success"], false);
        assert!(json.get("OperationComplete").is_none());
    }
}
