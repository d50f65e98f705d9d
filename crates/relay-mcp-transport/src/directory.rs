//! Agent directory lookups over HTTP.

use tracing::debug;

use relay_mcp_core::{Error, Result, TargetInfo};

/// Path serving the agent directory on the messaging server.
const AGENTS_PATH: &str = "/api/agents";

/// HTTP client for the server's agent directory.
#[derive(Debug, Default)]
pub struct DirectoryClient {
    http: reqwest::Client,
}

impl DirectoryClient {
    /// Create a client with default HTTP settings.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// List the agents reachable through `server_url`.
    ///
    /// Upstream failures surface as directory errors carrying the server's
    /// status; responses that lack the expected `data.agents` shape are
    /// malformed-response errors.
    pub async fn list_targets(&self, server_url: &str) -> Result<Vec<TargetInfo>> {
        let url = format!("{}{}", server_url.trim_end_matches('/'), AGENTS_PATH);
        debug!("Fetching agent directory: url={url}");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Directory(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Directory(format!("{url} returned {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Directory(format!("invalid JSON body: {e}")))?;
        parse_directory(&body)
    }
}

/// Extract `{id, name}` entries from `data.agents`.
fn parse_directory(body: &serde_json::Value) -> Result<Vec<TargetInfo>> {
    let agents = body
        .get("data")
        .and_then(|data| data.get("agents"))
        .and_then(|agents| agents.as_array())
        .ok_or_else(|| Error::MalformedResponse("missing data.agents array".to_string()))?;

    agents
        .iter()
        .map(|entry| {
            let id = entry
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::MalformedResponse("agent entry missing id".to_string()))?;
            let name = entry
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::MalformedResponse("agent entry missing name".to_string()))?;
            Ok(TargetInfo {
                id: id.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_directory() {
        let body = json!({
            "data": {
                "agents": [
                    {"id": "agent-1", "name": "Ada", "status": "active"},
                    {"id": "agent-2", "name": "Grace"},
                ]
            }
        });
        let targets = parse_directory(&body).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "agent-1");
        assert_eq!(targets[0].name, "Ada");
        assert_eq!(targets[1].name, "Grace");
    }

    #[test]
    fn test_parse_directory_empty_list() {
        let body = json!({"data": {"agents": []}});
        assert!(parse_directory(&body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_directory_missing_path() {
        let err = parse_directory(&json!({"agents": []})).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(err.to_string().contains("data.agents"));
    }

    #[test]
    fn test_parse_directory_not_an_array() {
        let body = json!({"data": {"agents": "nope"}});
        assert!(parse_directory(&body).is_err());
    }

    #[test]
    fn test_parse_directory_entry_missing_name() {
        let body = json!({"data": {"agents": [{"id": "agent-1"}]}});
        let err = parse_directory(&body).unwrap_err();
        assert!(err.to_string().contains("missing name"));
    }
}
