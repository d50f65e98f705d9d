//! MCP Tool Types
//!
//! This module defines all MCP tool parameter and response types. Responses
//! are serialized to pretty JSON inside the MCP text content by the server.

use relay_mcp_core::{SessionConfig, SessionConfigPatch, TargetInfo};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Connection Tools
// =============================================================================

/// Parameters for relay_connect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectParams {}

/// Response for relay_connect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectResponse {
    /// Connection state after the attempt
    pub state: String,

    /// Agent the session is bound to
    pub target_id: String,

    /// Channel joined for the conversation
    pub channel_id: String,

    /// Time the connect took in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,

    /// Success message
    pub message: String,
}

/// Parameters for relay_disconnect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DisconnectParams {}

/// Response for relay_disconnect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DisconnectResponse {
    /// Connection state after the close was issued
    pub state: String,

    /// Success message
    pub message: String,
}

// =============================================================================
// Messaging Tools
// =============================================================================

/// Parameters for relay_send_message
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendMessageParams {
    /// Message text to deliver to the target agent
    pub text: String,
}

/// Response for relay_send_message
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendMessageResponse {
    /// Correlation id stamped on the outbound send
    pub correlation_id: String,

    /// Agent the message was addressed to
    pub target_id: String,

    /// Success message
    pub message: String,
}

/// Parameters for relay_send_and_wait
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendAndWaitParams {
    /// Message text to deliver to the target agent
    pub text: String,
}

/// Response for relay_send_and_wait
///
/// A reply timeout is reported in-band (`timed_out` plus `error`) rather
/// than as a tool failure, so callers keep the session and can retry or
/// pick the late reply up through relay_wait_for_message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendAndWaitResponse {
    /// Reply body, when one arrived in time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,

    /// Identity that produced the reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,

    /// Timeout description when no reply arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time spent waiting in milliseconds
    pub elapsed_ms: u64,

    /// Whether the wait expired without a reply
    pub timed_out: bool,
}

/// Parameters for relay_wait_for_message
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForMessageParams {
    /// Wait budget in milliseconds (default: the configured response timeout)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response for relay_wait_for_message
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForMessageResponse {
    /// Reply body
    pub text: String,

    /// Identity that produced the reply
    pub sender_id: String,
}

// =============================================================================
// Target and Configuration Tools
// =============================================================================

/// Parameters for relay_switch_target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwitchTargetParams {
    /// Agent to rebind the session to
    pub target_id: String,

    /// Channel for the new conversation (must equal target_id)
    pub channel_id: String,
}

/// Response for relay_switch_target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwitchTargetResponse {
    /// Agent the session is now bound to
    pub target_id: String,

    /// Channel joined for the new conversation
    pub channel_id: String,

    /// Connection state after the switch
    pub state: String,

    /// Success message
    pub message: String,
}

/// Parameters for relay_set_config
///
/// Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SetConfigParams {
    /// New server base URL (http:// or https://)
    pub server_url: Option<String>,

    /// New sender identity
    pub user_id: Option<String>,

    /// New world id
    pub world_id: Option<String>,

    /// New target agent id
    pub target_id: Option<String>,

    /// New channel id (must equal target_id when both are set)
    pub channel_id: Option<String>,

    /// New connect budget in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// New reply-wait budget in milliseconds
    pub response_timeout_ms: Option<u64>,
}

impl From<SetConfigParams> for SessionConfigPatch {
    fn from(params: SetConfigParams) -> Self {
        Self {
            server_url: params.server_url,
            user_id: params.user_id,
            world_id: params.world_id,
            target_id: params.target_id,
            channel_id: params.channel_id,
            connect_timeout_ms: params.connect_timeout_ms,
            response_timeout_ms: params.response_timeout_ms,
        }
    }
}

/// Response for relay_set_config
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetConfigResponse {
    /// Configuration after the patch was applied
    pub config: SessionConfig,

    /// Whether an identity field changed value
    pub critical: bool,

    /// Whether the session reconnected as part of the update
    pub reconnected: bool,

    /// Connection state after the update
    pub state: String,

    /// Success message
    pub message: String,
}

// =============================================================================
// Introspection Tools
// =============================================================================

/// Parameters for relay_get_state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetStateParams {}

/// Response for relay_get_state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetStateResponse {
    /// Current connection state
    pub state: String,

    /// Whether the socket is up
    pub connected: bool,

    /// Whether the channel join went through on this connection
    pub joined: bool,

    /// Replies buffered and waiting for a consumer
    pub queued_replies: usize,

    /// Callers blocked waiting for a reply
    pub outstanding_waiters: usize,

    /// Duration of the last successful connect in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connect_ms: Option<u64>,

    /// Agent the session is bound to
    pub target_id: String,

    /// Channel joined for the conversation
    pub channel_id: String,
}

/// Parameters for relay_get_config
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetConfigParams {}

/// Response for relay_get_config (returns the configuration snapshot)
pub type GetConfigResponse = SessionConfig;

/// Parameters for relay_list_targets
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTargetsParams {}

/// Response for relay_list_targets
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTargetsResponse {
    /// Agents reachable through the server
    pub targets: Vec<TargetInfo>,

    /// Total count
    pub count: usize,
}
