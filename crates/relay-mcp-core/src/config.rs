//! Configuration types for the relay bridge.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// Default overall connect budget in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default reply-wait budget in milliseconds.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 30_000;

/// Connection attempts before the transport gives up.
pub const DEFAULT_RETRY_COUNT: u32 = 5;

/// Fixed delay between connection attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Settle delay between teardown and reconnect when switching targets.
pub const SWITCH_GRACE_DELAY_MS: u64 = 250;

/// Session configuration for the bridge.
///
/// Constructed once at process entry and handed to the session whole;
/// the engine itself never reads environment variables. Empty identity
/// strings mean "not yet set".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the messaging server (http:// or https://)
    pub server_url: String,
    /// Identity the bridge sends messages as
    pub user_id: String,
    /// World the target agent lives in
    pub world_id: String,
    /// Agent the session is bound to
    pub target_id: String,
    /// Channel joined for the conversation (must equal `target_id`)
    pub channel_id: String,
    /// Overall connect budget in milliseconds
    pub connect_timeout_ms: u64,
    /// Default reply-wait budget in milliseconds
    pub response_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            user_id: String::new(),
            world_id: String::new(),
            target_id: String::new(),
            channel_id: String::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: SessionConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Identity fields may be empty (they can arrive later through a
    /// reconfiguration), but whatever is present must be consistent.
    pub fn validate(&self) -> crate::Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be > 0".to_string()));
        }
        if self.response_timeout_ms == 0 {
            return Err(Error::Config("response_timeout_ms must be > 0".to_string()));
        }
        if !self.server_url.is_empty()
            && !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "server_url must be http:// or https://, got: {}",
                self.server_url
            )));
        }
        self.validate_identity()
    }

    /// Enforce the target/channel pairing invariant.
    ///
    /// The platform models a direct-message channel per agent, so whenever
    /// both ids are present they must be the same string.
    pub fn validate_identity(&self) -> crate::Result<()> {
        if !self.target_id.is_empty()
            && !self.channel_id.is_empty()
            && self.target_id != self.channel_id
        {
            return Err(Error::TargetChannelMismatch {
                target: self.target_id.clone(),
                channel: self.channel_id.clone(),
            });
        }
        Ok(())
    }

    /// True when target and channel are both set (and therefore equal).
    pub fn has_routable_target(&self) -> bool {
        !self.target_id.is_empty()
            && !self.channel_id.is_empty()
            && self.target_id == self.channel_id
    }

    /// True when every identity field is populated.
    pub fn is_identity_complete(&self) -> bool {
        !self.server_url.is_empty()
            && !self.user_id.is_empty()
            && !self.world_id.is_empty()
            && !self.target_id.is_empty()
            && !self.channel_id.is_empty()
    }

    /// WebSocket endpoint derived from the server base URL.
    pub fn ws_url(&self) -> String {
        if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{}/ws", rest.trim_end_matches('/'))
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{}/ws", rest.trim_end_matches('/'))
        } else {
            format!("{}/ws", self.server_url.trim_end_matches('/'))
        }
    }

    /// Apply a partial update, returning `true` when an identity field
    /// actually changed value.
    ///
    /// Timeout-only updates return `false`; callers use the return value
    /// to decide whether the live connection must be torn down.
    pub fn apply(&mut self, patch: &SessionConfigPatch) -> bool {
        let mut identity_changed = false;

        let mut set = |slot: &mut String, value: &Option<String>| {
            if let Some(v) = value {
                if slot != v {
                    *slot = v.clone();
                    identity_changed = true;
                }
            }
        };
        set(&mut self.server_url, &patch.server_url);
        set(&mut self.user_id, &patch.user_id);
        set(&mut self.world_id, &patch.world_id);
        set(&mut self.target_id, &patch.target_id);
        set(&mut self.channel_id, &patch.channel_id);

        if let Some(ms) = patch.connect_timeout_ms {
            self.connect_timeout_ms = ms;
        }
        if let Some(ms) = patch.response_timeout_ms {
            self.response_timeout_ms = ms;
        }

        identity_changed
    }
}

/// Partial session configuration used by reconfiguration requests.
///
/// Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionConfigPatch {
    /// New server base URL
    pub server_url: Option<String>,
    /// New sender identity
    pub user_id: Option<String>,
    /// New world id
    pub world_id: Option<String>,
    /// New target agent id
    pub target_id: Option<String>,
    /// New channel id
    pub channel_id: Option<String>,
    /// New connect budget in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// New reply-wait budget in milliseconds
    pub response_timeout_ms: Option<u64>,
}

impl SessionConfigPatch {
    /// True when the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn populated() -> SessionConfig {
        SessionConfig {
            server_url: "http://localhost:3000".to_string(),
            user_id: "user-1".to_string(),
            world_id: "world-1".to_string(),
            target_id: "agent-1".to_string(),
            channel_id: "agent-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.server_url.is_empty());
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(config.response_timeout_ms, DEFAULT_RESPONSE_TIMEOUT_MS);
        assert!(!config.is_identity_complete());
    }

    #[test]
    fn test_config_validation() {
        assert!(populated().validate().is_ok());
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = populated();
        config.connect_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = populated();
        config.response_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_scheme_rejected() {
        let mut config = populated();
        config.server_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mismatched_identity_rejected() {
        let mut config = populated();
        config.channel_id = "agent-2".to_string();
        let err = config.validate_identity().unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_partial_identity_allowed() {
        let mut config = populated();
        config.channel_id = String::new();
        assert!(config.validate_identity().is_ok());
        assert!(!config.has_routable_target());
    }

    #[test]
    fn test_routable_target() {
        assert!(populated().has_routable_target());
        assert!(!SessionConfig::default().has_routable_target());
    }

    #[test]
    fn test_ws_url_scheme_swap() {
        let mut config = populated();
        assert_eq!(config.ws_url(), "ws://localhost:3000/ws");

        config.server_url = "https://relay.example.com/".to_string();
        assert_eq!(config.ws_url(), "wss://relay.example.com/ws");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server_url: "http://localhost:3000"
user_id: "user-1"
world_id: "world-1"
target_id: "agent-1"
channel_id: "agent-1"
connect_timeout_ms: 5000
response_timeout_ms: 20000
"#;
        let config = SessionConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server_url, "http://localhost:3000");
        assert_eq!(config.target_id, "agent-1");
        assert_eq!(config.connect_timeout_ms, 5000);
        assert_eq!(config.response_timeout_ms, 20000);
    }

    #[test]
    fn test_parse_yaml_defaults_missing_fields() {
        let config = SessionConfig::from_yaml("target_id: \"agent-1\"\nchannel_id: \"agent-1\"\n")
            .unwrap();
        assert_eq!(config.target_id, "agent-1");
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert!(config.user_id.is_empty());
    }

    #[test]
    fn test_parse_yaml_rejects_mismatch() {
        let yaml = "target_id: \"agent-1\"\nchannel_id: \"agent-2\"\n";
        assert!(SessionConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_apply_timeouts_not_critical() {
        let mut config = populated();
        let patch = SessionConfigPatch {
            connect_timeout_ms: Some(2000),
            response_timeout_ms: Some(9000),
            ..Default::default()
        };
        assert!(!config.apply(&patch));
        assert_eq!(config.connect_timeout_ms, 2000);
        assert_eq!(config.response_timeout_ms, 9000);
    }

    #[test]
    fn test_apply_identity_is_critical() {
        let mut config = populated();
        let patch = SessionConfigPatch {
            target_id: Some("agent-2".to_string()),
            channel_id: Some("agent-2".to_string()),
            ..Default::default()
        };
        assert!(config.apply(&patch));
        assert_eq!(config.target_id, "agent-2");
        assert_eq!(config.channel_id, "agent-2");
    }

    #[test]
    fn test_apply_same_value_not_critical() {
        let mut config = populated();
        let patch = SessionConfigPatch {
            target_id: Some("agent-1".to_string()),
            ..Default::default()
        };
        assert!(!config.apply(&patch));
    }

    #[test]
    fn test_empty_patch() {
        assert!(SessionConfigPatch::default().is_empty());
        let patch = SessionConfigPatch {
            user_id: Some("u".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    proptest! {
        #[test]
        fn prop_distinct_target_channel_always_rejected(
            target in "[a-z0-9-]{1,16}",
            channel in "[a-z0-9-]{1,16}",
        ) {
            prop_assume!(target != channel);
            let config = SessionConfig {
                target_id: target,
                channel_id: channel,
                ..Default::default()
            };
            prop_assert!(config.validate_identity().is_err());
            prop_assert!(!config.has_routable_target());
        }

        #[test]
        fn prop_equal_target_channel_accepted(id in "[a-z0-9-]{1,16}") {
            let config = SessionConfig {
                target_id: id.clone(),
                channel_id: id,
                ..Default::default()
            };
            prop_assert!(config.validate_identity().is_ok());
            prop_assert!(config.has_routable_target());
        }
    }
}
