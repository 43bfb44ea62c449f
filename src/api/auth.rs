//! Proxmox API authentication

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::config::ClusterConfig;
use crate::error::{ProxtopError, Result};

lazy_static! {
    /// `user@realm!tokenname`
    static ref TOKEN_ID_RE: Regex =
        Regex::new(r"^[^@!\s]+@[A-Za-z0-9._-]+![A-Za-z][A-Za-z0-9._-]*$").unwrap();
}

/// Credentials used to talk to the cluster
#[derive(Clone)]
pub enum Credentials {
    /// API token, sent on every request
    Token { id: String, secret: String },
    /// User and password, exchanged for a ticket
    Password { username: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { id, .. } => f.debug_struct("Token").field("id", id).finish(),
            Self::Password { username, .. } => {
                f.debug_struct("Password").field("username", username).finish()
            }
        }
    }
}

impl Credentials {
    /// Pick credentials from the cluster configuration. A token wins over a password.
    pub fn from_config(cluster: &ClusterConfig) -> Result<Self> {
        if let Some(id) = cluster.token_id.as_deref() {
            if !TOKEN_ID_RE.is_match(id) {
                return Err(ProxtopError::config(format!(
                    "Invalid API token id '{}', expected user@realm!tokenname",
                    id
                )));
            }
            let secret = cluster.token_secret.clone().ok_or_else(|| {
                ProxtopError::config(
                    "API token id given but no secret (set cluster.token_secret or PROXTOP_TOKEN_SECRET)",
                )
            })?;
            return Ok(Self::Token {
                id: id.to_string(),
                secret,
            });
        }

        let username = cluster
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProxtopError::config("No username configured (use --user or cluster.username)"))?;
        let password = cluster.password.clone().ok_or_else(|| {
            ProxtopError::config("No password available (set PROXTOP_PASSWORD or cluster.password)")
        })?;

        Ok(Self::Password {
            username: normalize_username(username),
            password,
        })
    }

    /// User the session acts as
    pub fn principal(&self) -> &str {
        match self {
            Self::Token { id, .. } => id,
            Self::Password { username, .. } => username,
        }
    }
}

/// Append the default `pam` realm to a bare user name
pub fn normalize_username(username: &str) -> String {
    if username.contains('@') {
        username.to_string()
    } else {
        format!("{}@pam", username)
    }
}

/// `Authorization` header value for API token auth
pub fn token_header(id: &str, secret: &str) -> String {
    format!("PVEAPIToken={}={}", id, secret)
}

/// `Cookie` header value for ticket auth
pub fn ticket_cookie(ticket: &str) -> String {
    format!("PVEAuthCookie={}", ticket)
}

/// Payload of `POST /access/ticket`
#[derive(Debug, Clone, Deserialize)]
pub struct Ticket {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> ClusterConfig {
        ClusterConfig {
            host: Some("pve".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_preferred() {
        let mut cfg = cluster();
        cfg.username = Some("root@pam".into());
        cfg.password = Some("pw".into());
        cfg.token_id = Some("monitor@pve!proxtop".into());
        cfg.token_secret = Some("aaaa-bbbb".into());

        let creds = Credentials::from_config(&cfg).unwrap();
        assert!(matches!(creds, Credentials::Token { .. }));
        assert_eq!(creds.principal(), "monitor@pve!proxtop");
    }

    #[test]
    fn test_invalid_token_id() {
        let mut cfg = cluster();
        cfg.token_id = Some("monitor-proxtop".into());
        cfg.token_secret = Some("x".into());
        assert!(Credentials::from_config(&cfg).is_err());
    }

    #[test]
    fn test_token_without_secret() {
        let mut cfg = cluster();
        cfg.token_id = Some("monitor@pve!proxtop".into());
        let err = Credentials::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn test_password_realm_default() {
        let mut cfg = cluster();
        cfg.username = Some("monitor".into());
        cfg.password = Some("pw".into());
        let creds = Credentials::from_config(&cfg).unwrap();
        assert_eq!(creds.principal(), "monitor@pam");
    }

    #[test]
    fn test_missing_password() {
        let mut cfg = cluster();
        cfg.username = Some("monitor@pve".into());
        let err = Credentials::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_headers() {
        assert_eq!(token_header("a@pve!t", "s"), "PVEAPIToken=a@pve!t=s");
        assert_eq!(ticket_cookie("PVE:x"), "PVEAuthCookie=PVE:x");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::Password {
            username: "root@pam".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_ticket_payload() {
        let json = r#"{"ticket":"PVE:root@pam:65","CSRFPreventionToken":"65:abc","username":"root@pam","cap":{}}"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.csrf_token, "65:abc");
        assert_eq!(ticket.username.as_deref(), Some("root@pam"));
    }
}
