//! Relay MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router] pattern.
//! It routes MCP tool calls to the underlying bridge session.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};

use tracing::{debug, error, info, instrument, warn};

use relay_mcp_core::{Error, SessionConfig};
use relay_mcp_session::BridgeSession;
use relay_mcp_transport::WsTransport;

use crate::tools::*;

/// Map an engine error onto the MCP error space.
///
/// Configuration and identity mistakes are the caller's fault (-32602);
/// everything else is reported as an internal error (-32603).
fn to_mcp_error(err: &Error) -> McpError {
    match err {
        Error::Config(_) | Error::TargetChannelMismatch { .. } => {
            McpError::new(ErrorCode(-32602), err.to_string(), None)
        }
        _ => McpError::new(ErrorCode(-32603), err.to_string(), None),
    }
}

/// Relay MCP Server
///
/// Holds the single persistent bridge session and exposes it via MCP tools.
#[derive(Clone)]
pub struct RelayMcpServer {
    /// Bridge session shared by every tool call
    session: Arc<BridgeSession>,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RelayMcpServer {
    /// Create a server backed by a live socket transport.
    pub fn new(config: SessionConfig) -> relay_mcp_core::Result<Self> {
        let transport = Arc::new(WsTransport::new());
        let session = BridgeSession::new(config, transport)?;
        Ok(Self::with_session(Arc::new(session)))
    }

    /// Create a server over an existing session.
    ///
    /// Tests use this to run the tool surface against a mock transport.
    pub fn with_session(session: Arc<BridgeSession>) -> Self {
        Self {
            session,
            tool_router: Self::tool_router(),
        }
    }

    /// Handle to the underlying session, for shutdown handling.
    pub fn session(&self) -> Arc<BridgeSession> {
        Arc::clone(&self.session)
    }

    /// Connect to the messaging server
    #[tool(description = "Connect to the messaging server and join the target channel")]
    #[instrument(skip_all)]
    async fn relay_connect(
        &self,
        Parameters(_params): Parameters<ConnectParams>,
    ) -> Result<CallToolResult, McpError> {
        let config = self.session.config();
        info!(
            "Connecting session: server='{}', target='{}'",
            config.server_url, config.target_id
        );

        self.session.connect().await.map_err(|e| {
            error!("Connect failed: {}", e);
            to_mcp_error(&e)
        })?;

        let status = self.session.status();
        info!(
            "Session connected: state={}, elapsed={:?}ms",
            status.state, status.last_connect_ms
        );

        let response = ConnectResponse {
            state: status.state.to_string(),
            target_id: config.target_id.clone(),
            channel_id: config.channel_id.clone(),
            elapsed_ms: status.last_connect_ms,
            message: format!("Connected to '{}'", config.target_id),
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| status.state.to_string()),
        )]))
    }

    /// Close the connection
    #[tool(description = "Close the connection to the messaging server")]
    #[instrument(skip_all)]
    async fn relay_disconnect(
        &self,
        Parameters(_params): Parameters<DisconnectParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Disconnecting session");

        self.session.disconnect();

        // The state lands on disconnected once the socket confirms the close;
        // report whatever is current rather than waiting for it.
        let state = self.session.state();
        let response = DisconnectResponse {
            state: state.to_string(),
            message: "Connection close requested".to_string(),
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| state.to_string()),
        )]))
    }

    /// Send a message without waiting for the reply
    #[tool(description = "Send a message to the target agent without waiting for a reply")]
    #[instrument(skip_all)]
    async fn relay_send_message(
        &self,
        Parameters(params): Parameters<SendMessageParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.text.trim().is_empty() {
            warn!("Rejecting empty message text");
            return Err(McpError::new(
                ErrorCode(-32602),
                "Message text must not be empty".to_string(),
                None,
            ));
        }

        debug!(
            "Sending message: length={} chars",
            params.text.chars().count()
        );

        let correlation_id = self.session.send(&params.text).await.map_err(|e| {
            error!("Send failed: {}", e);
            to_mcp_error(&e)
        })?;

        let config = self.session.config();
        let response = SendMessageResponse {
            correlation_id: correlation_id.clone(),
            target_id: config.target_id.clone(),
            message: format!("Message sent to '{}'", config.target_id),
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response).unwrap_or(correlation_id),
        )]))
    }

    /// Send a message and wait for the next reply
    #[tool(
        description = "Send a message to the target agent and wait for its reply; a timeout is reported in the response rather than as an error"
    )]
    #[instrument(skip_all)]
    async fn relay_send_and_wait(
        &self,
        Parameters(params): Parameters<SendAndWaitParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.text.trim().is_empty() {
            warn!("Rejecting empty message text");
            return Err(McpError::new(
                ErrorCode(-32602),
                "Message text must not be empty".to_string(),
                None,
            ));
        }

        debug!(
            "Sending message and awaiting reply: length={} chars",
            params.text.chars().count()
        );

        let outcome = self.session.send_and_await(&params.text).await.map_err(|e| {
            error!("Send-and-wait failed: {}", e);
            to_mcp_error(&e)
        })?;

        let timed_out = outcome.is_timeout();
        if timed_out {
            warn!("No reply within {}ms", outcome.elapsed_ms);
        } else {
            info!("Reply received after {}ms", outcome.elapsed_ms);
        }

        let response = SendAndWaitResponse {
            reply: outcome.reply.as_ref().map(|r| r.text.clone()),
            sender_id: outcome.reply.as_ref().map(|r| r.sender_id.clone()),
            error: outcome.error,
            elapsed_ms: outcome.elapsed_ms,
            timed_out,
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| format!("Reply wait finished after {}ms", response.elapsed_ms)),
        )]))
    }

    /// Wait for the next reply from the target
    #[tool(
        description = "Wait for the next message from the target agent, failing if none arrives in time"
    )]
    #[instrument(skip_all)]
    async fn relay_wait_for_message(
        &self,
        Parameters(params): Parameters<WaitForMessageParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Waiting for next message: timeout_ms={:?}", params.timeout_ms);

        let reply = self.session.wait_for_next(params.timeout_ms).await.map_err(|e| {
            warn!("Wait for message failed: {}", e);
            to_mcp_error(&e)
        })?;

        info!("Message received from '{}'", reply.sender_id);

        let response = WaitForMessageResponse {
            text: reply.text,
            sender_id: reply.sender_id,
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| response.text.clone()),
        )]))
    }

    /// Rebind the session to a different agent
    #[tool(
        description = "Switch the session to a different target agent and channel (tears down and reconnects)"
    )]
    #[instrument(skip_all)]
    async fn relay_switch_target(
        &self,
        Parameters(params): Parameters<SwitchTargetParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Switching target: target_id='{}', channel_id='{}'",
            params.target_id, params.channel_id
        );

        self.session
            .switch_target(&params.target_id, &params.channel_id)
            .await
            .map_err(|e| {
                error!("Target switch failed: {}", e);
                to_mcp_error(&e)
            })?;

        info!("Target switched successfully to '{}'", params.target_id);

        let response = SwitchTargetResponse {
            target_id: params.target_id.clone(),
            channel_id: params.channel_id.clone(),
            state: self.session.state().to_string(),
            message: format!("Session rebound to '{}'", params.target_id),
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| format!("Switched to '{}'", params.target_id)),
        )]))
    }

    /// Apply a partial configuration update
    #[tool(
        description = "Update session configuration; identity changes tear the connection down and reconnect when the identity is complete"
    )]
    #[instrument(skip_all)]
    async fn relay_set_config(
        &self,
        Parameters(params): Parameters<SetConfigParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Applying configuration patch");

        let outcome = self.session.set_config(params.into()).await.map_err(|e| {
            error!("Reconfiguration failed: {}", e);
            to_mcp_error(&e)
        })?;

        info!(
            "Configuration applied: critical={}, reconnected={}",
            outcome.critical, outcome.reconnected
        );

        let response = SetConfigResponse {
            config: outcome.config,
            critical: outcome.critical,
            reconnected: outcome.reconnected,
            state: outcome.state.to_string(),
            message: if outcome.reconnected {
                "Configuration applied; session reconnected".to_string()
            } else {
                "Configuration applied".to_string()
            },
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| "Configuration applied".to_string()),
        )]))
    }

    /// Report the session state
    #[tool(description = "Get the current connection state and session counters")]
    #[instrument(skip_all)]
    async fn relay_get_state(
        &self,
        Parameters(_params): Parameters<GetStateParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Reporting session state");

        let status = self.session.status();
        let config = self.session.config();

        let response = GetStateResponse {
            state: status.state.to_string(),
            connected: status.state.is_connected(),
            joined: status.joined,
            queued_replies: status.queued_replies,
            outstanding_waiters: status.outstanding_waiters,
            last_connect_ms: status.last_connect_ms,
            target_id: config.target_id,
            channel_id: config.channel_id,
        };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| status.state.to_string()),
        )]))
    }

    /// Report the configuration snapshot
    #[tool(description = "Get the current session configuration")]
    #[instrument(skip_all)]
    async fn relay_get_config(
        &self,
        Parameters(_params): Parameters<GetConfigParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Reporting configuration snapshot");

        let config: GetConfigResponse = self.session.config();

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&config)
                .unwrap_or_else(|_| "configuration unavailable".to_string()),
        )]))
    }

    /// Query the agent directory
    #[tool(description = "List the agents reachable through the messaging server")]
    #[instrument(skip_all)]
    async fn relay_list_targets(
        &self,
        Parameters(_params): Parameters<ListTargetsParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Listing directory targets");

        let targets = self.session.list_targets().await.map_err(|e| {
            error!("Directory query failed: {}", e);
            to_mcp_error(&e)
        })?;

        let count = targets.len();
        info!("Found {} target(s)", count);

        let response = ListTargetsResponse { targets, count };

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| format!("{count} targets available")),
        )]))
    }
}

// Implement the ServerHandler trait to define server capabilities
#[tool_handler]
impl rmcp::ServerHandler for RelayMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Relay MCP Server - Bridge to agents on a remote messaging platform. \
                 Use relay_connect to open the session, relay_send_and_wait for a \
                 correlated request/reply exchange, relay_send_message for fire-and-forget \
                 sends, and relay_wait_for_message to pick up replies later."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
