//! Proxmox VE HTTP API client

pub mod auth;

pub use auth::Credentials;

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{ClusterConfig, NetworkConfig};
use crate::error::{ProxtopError, Result};
use crate::models::{
    ApiVersion, ClusterResource, ConsolidationFunction, GuestKind, NodeStatus, ResourceType,
    RrdPoint, Timeframe,
};

use auth::Ticket;

/// Every API response is wrapped in a `data` member
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

/// Client for a single Proxmox cluster
pub struct ProxmoxClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    session: RwLock<Option<Ticket>>,
    retries: u32,
    retry_backoff: Duration,
}

impl ProxmoxClient {
    /// Create a client from configuration. No request is made yet.
    pub fn new(cluster: &ClusterConfig, network: &NetworkConfig) -> Result<Self> {
        Self::with_base_url(cluster.base_url()?, cluster, network)
    }

    /// Create a client for an explicit API base URL, such as a reverse proxy
    /// in front of the cluster. `cluster.host` and `cluster.port` are ignored.
    pub fn with_base_url(
        base_url: impl Into<String>,
        cluster: &ClusterConfig,
        network: &NetworkConfig,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let credentials = Credentials::from_config(cluster)?;

        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
            .timeout(Duration::from_secs(network.timeout.max(1)))
            .danger_accept_invalid_certs(!cluster.verify_tls)
            .build()?;

        Ok(Self {
            client,
            base_url,
            credentials,
            session: RwLock::new(None),
            retries: network.retries,
            retry_backoff: Duration::from_millis(network.retry_backoff_ms),
        })
    }

    /// Base URL of the JSON API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Credentials in use
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Obtain a fresh ticket. A no-op for API token auth.
    pub async fn login(&self) -> Result<()> {
        let (username, password) = match &self.credentials {
            Credentials::Token { .. } => return Ok(()),
            Credentials::Password { username, password } => (username, password),
        };

        debug!("Requesting ticket for {}", username);
        let resp = self
            .client
            .post(format!("{}/access/ticket", self.base_url))
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProxtopError::Authentication(format!(
                "invalid credentials for {}",
                username
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProxtopError::api(status.as_u16(), error_message(status, &body)));
        }

        let envelope: Envelope<Ticket> = resp.json().await?;
        let ticket = envelope
            .data
            .ok_or_else(|| ProxtopError::Authentication("no ticket in response".into()))?;

        *self.session.write().await = Some(ticket);
        Ok(())
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match &self.credentials {
            Credentials::Token { id, secret } => {
                Ok(request.header(AUTHORIZATION, auth::token_header(id, secret)))
            }
            Credentials::Password { .. } => {
                if self.session.read().await.is_none() {
                    self.login().await?;
                }
                let session = self.session.read().await;
                let ticket = session
                    .as_ref()
                    .ok_or_else(|| ProxtopError::Authentication("not logged in".into()))?;
                Ok(request
                    .header(COOKIE, auth::ticket_cookie(&ticket.ticket))
                    .header("CSRFPreventionToken", ticket.csrf_token.clone()))
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let request = self.authorize(self.client.get(&url).query(query)).await?;
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProxtopError::api(status.as_u16(), error_message(status, &body)));
        }

        let envelope: Envelope<T> = resp.json().await?;
        envelope
            .data
            .ok_or_else(|| ProxtopError::api(status.as_u16(), format!("empty response for {}", path)))
    }

    /// GET an API path and unwrap the `data` envelope.
    ///
    /// Retries transient failures with exponential backoff and renews an
    /// expired ticket once.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut attempt = 0;
        let mut renewed = false;

        loop {
            match self.get_once(path, query).await {
                Ok(data) => return Ok(data),
                Err(ProxtopError::Api { status: 401, .. })
                    if !renewed && matches!(self.credentials, Credentials::Password { .. }) =>
                {
                    warn!("Ticket rejected for {}, logging in again", path);
                    renewed = true;
                    *self.session.write().await = None;
                    self.login().await?;
                }
                Err(ProxtopError::Api { status: 401, message }) => {
                    return Err(ProxtopError::Authentication(message));
                }
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = backoff_delay(self.retry_backoff, attempt);
                    attempt += 1;
                    warn!(
                        "GET {} failed ({}), retry {}/{} in {:?}",
                        path, e, attempt, self.retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Cluster version information
    pub async fn version(&self) -> Result<ApiVersion> {
        self.get("/version", &[]).await
    }

    /// Cluster wide resource list, optionally filtered by type
    pub async fn cluster_resources(
        &self,
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<ClusterResource>> {
        match resource_type.and_then(|t| t.query_value()) {
            Some(kind) => self.get("/cluster/resources", &[("type", kind)]).await,
            None => self.get("/cluster/resources", &[]).await,
        }
    }

    /// RRD history of a single guest
    pub async fn guest_rrddata(
        &self,
        node: &str,
        kind: GuestKind,
        vmid: u32,
        timeframe: Timeframe,
        cf: ConsolidationFunction,
    ) -> Result<Vec<RrdPoint>> {
        let path = format!("/nodes/{}/{}/{}/rrddata", node, kind.path_segment(), vmid);
        self.get(&path, &[("timeframe", timeframe.as_str()), ("cf", cf.as_str())])
            .await
    }

    /// RRD history of a node
    pub async fn node_rrddata(
        &self,
        node: &str,
        timeframe: Timeframe,
        cf: ConsolidationFunction,
    ) -> Result<Vec<RrdPoint>> {
        let path = format!("/nodes/{}/rrddata", node);
        self.get(&path, &[("timeframe", timeframe.as_str()), ("cf", cf.as_str())])
            .await
    }

    /// Detailed status of a node
    pub async fn node_status(&self, node: &str) -> Result<NodeStatus> {
        self.get(&format!("/nodes/{}/status", node), &[]).await
    }
}

/// Delay before retry number `attempt + 1`
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Best effort error text from a failed response
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        if let Some(serde_json::Value::Object(errors)) = envelope.errors {
            let mut parts: Vec<String> = errors
                .iter()
                .map(|(field, msg)| match msg.as_str() {
                    Some(text) => format!("{}: {}", field, text.trim()),
                    None => format!("{}: {}", field, msg),
                })
                .collect();
            parts.sort();
            if !parts.is_empty() {
                return parts.join(", ");
            }
        }
    } else {
        let text = body.trim();
        if !text.is_empty() && text.len() <= 200 {
            return text.to_string();
        }
    }

    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> ClusterConfig {
        ClusterConfig {
            host: Some("127.0.0.1".into()),
            port: 1,
            token_id: Some("monitor@pve!proxtop".into()),
            token_secret: Some("secret".into()),
            verify_tls: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
    }

    #[test]
    fn test_error_message_from_errors_object() {
        let body = r#"{"data":null,"errors":{"vmid":"invalid format","node":"no such node"}}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body),
            "node: no such node, vmid: invalid format"
        );
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(
            error_message(StatusCode::FORBIDDEN, r#"{"data":null}"#),
            "Forbidden"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "proxy loop detected"),
            "proxy loop detected"
        );
    }

    #[test]
    fn test_envelope() {
        let envelope: Envelope<Vec<RrdPoint>> =
            serde_json::from_str(r#"{"data":[{"time":1},{"time":2,"cpu":0.1}]}"#).unwrap();
        assert_eq!(envelope.data.unwrap().len(), 2);
    }

    #[test]
    fn test_new_client() {
        let client = ProxmoxClient::new(&cluster(), &NetworkConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://127.0.0.1:1/api2/json");
        assert_eq!(client.credentials().principal(), "monitor@pve!proxtop");
    }

    #[test]
    fn test_new_client_requires_host() {
        let mut cfg = cluster();
        cfg.host = None;
        assert!(ProxmoxClient::new(&cfg, &NetworkConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_cluster_fails_after_retries() {
        let network = NetworkConfig {
            timeout: 2,
            retries: 1,
            retry_backoff_ms: 1,
            concurrency: 1,
        };
        let client = ProxmoxClient::new(&cluster(), &network).unwrap();
        let err = client.version().await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {}", err);
    }

    /// Minimal HTTP/1.1 server: each connection gets one canned response
    mod server {
        use std::sync::{Arc, Mutex};

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        pub type Requests = Arc<Mutex<Vec<String>>>;

        async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);

                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }

        /// Serve until the test ends. `respond` sees the raw request and the
        /// number of earlier requests with the same request line.
        pub async fn start<F>(respond: F) -> (String, Requests)
        where
            F: Fn(&str, usize) -> (u16, String) + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests: Requests = Arc::new(Mutex::new(Vec::new()));
            let respond = Arc::new(respond);

            let log = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let Ok(request) = read_request(&mut stream).await else {
                        continue;
                    };
                    let line = request.lines().next().unwrap_or_default().to_string();
                    let seen = {
                        let mut log = log.lock().unwrap();
                        let seen = log
                            .iter()
                            .filter(|r| r.lines().next() == Some(line.as_str()))
                            .count();
                        log.push(request.clone());
                        seen
                    };

                    let (status, body) = respond(&request, seen);
                    let response = format!(
                        "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });

            (format!("http://{}/api2/json", addr), requests)
        }

        pub fn count(requests: &Requests, prefix: &str) -> usize {
            requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.starts_with(prefix))
                .count()
        }
    }

    fn fast_network(retries: u32) -> NetworkConfig {
        NetworkConfig {
            timeout: 5,
            retries,
            retry_backoff_ms: 1,
            concurrency: 1,
        }
    }

    fn password_cluster() -> ClusterConfig {
        ClusterConfig {
            username: Some("monitor".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        }
    }

    const TICKET: &str =
        r#"{"data":{"ticket":"PVE:monitor@pam:1","CSRFPreventionToken":"csrf1","username":"monitor@pam"}}"#;

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (url, requests) = server::start(|_, _| (500, r#"{"data":null}"#.to_string())).await;
        let client = ProxmoxClient::with_base_url(url, &cluster(), &fast_network(2)).unwrap();

        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ProxtopError::Api { status: 500, .. }), "{}", err);
        assert_eq!(server::count(&requests, "GET /api2/json/version"), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, requests) = server::start(|_, _| {
            (403, r#"{"data":null,"errors":{"path":"permission denied"}}"#.to_string())
        })
        .await;
        let client = ProxmoxClient::with_base_url(url, &cluster(), &fast_network(3)).unwrap();

        let err = client.version().await.unwrap_err();
        match err {
            ProxtopError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "path: permission denied");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_token_header_and_query() {
        let (url, requests) = server::start(|_, _| {
            (200, r#"{"data":[{"time":60,"cpu":0.1,"maxcpu":8,"memused":1024,"memtotal":4096}]}"#.to_string())
        })
        .await;
        let client = ProxmoxClient::with_base_url(url, &cluster(), &fast_network(0)).unwrap();

        let points = client
            .node_rrddata("pve1", Timeframe::Day, ConsolidationFunction::Max)
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].mem, Some(1024.0));

        let request = requests.lock().unwrap()[0].to_lowercase();
        assert!(request.starts_with("get /api2/json/nodes/pve1/rrddata?timeframe=day&cf=max "));
        assert!(request.contains("authorization: pveapitoken=monitor@pve!proxtop=secret"));
    }

    #[tokio::test]
    async fn test_ticket_login_flow() {
        let (url, requests) = server::start(|request, _| {
            if request.starts_with("POST /api2/json/access/ticket") {
                (200, TICKET.to_string())
            } else {
                (200, r#"{"data":{"version":"8.2.4","release":"8.2"}}"#.to_string())
            }
        })
        .await;
        let client =
            ProxmoxClient::with_base_url(url, &password_cluster(), &fast_network(0)).unwrap();

        let version = client.version().await.unwrap();
        assert_eq!(version.version, "8.2.4");
        client.version().await.unwrap();

        // one login serves both requests
        assert_eq!(server::count(&requests, "POST /api2/json/access/ticket"), 1);
        assert_eq!(server::count(&requests, "GET /api2/json/version"), 2);

        let log = requests.lock().unwrap();
        assert!(log[0].contains("username=monitor%40pam"));
        assert!(log[0].contains("password=hunter2"));
        let get = log[1].to_lowercase();
        assert!(get.contains("cookie: pveauthcookie=pve:monitor@pam:1"));
        assert!(get.contains("csrfpreventiontoken: csrf1"));
    }

    #[tokio::test]
    async fn test_expired_ticket_is_renewed_once() {
        let (url, requests) = server::start(|request, seen| {
            if request.starts_with("POST") {
                (200, TICKET.to_string())
            } else if seen == 0 {
                (401, r#"{"data":null}"#.to_string())
            } else {
                (200, r#"{"data":{"version":"8.2.4","release":"8.2"}}"#.to_string())
            }
        })
        .await;
        let client =
            ProxmoxClient::with_base_url(url, &password_cluster(), &fast_network(0)).unwrap();

        client.version().await.unwrap();
        assert_eq!(server::count(&requests, "POST /api2/json/access/ticket"), 2);
        assert_eq!(server::count(&requests, "GET /api2/json/version"), 2);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_authentication_error() {
        let (url, requests) = server::start(|request, _| {
            if request.starts_with("POST") {
                (200, TICKET.to_string())
            } else {
                (401, r#"{"data":null}"#.to_string())
            }
        })
        .await;
        let client =
            ProxmoxClient::with_base_url(url, &password_cluster(), &fast_network(2)).unwrap();

        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ProxtopError::Authentication(_)), "{}", err);
        assert_eq!(server::count(&requests, "POST /api2/json/access/ticket"), 2);
        assert_eq!(server::count(&requests, "GET /api2/json/version"), 2);
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let (url, requests) = server::start(|_, _| (401, r#"{"data":null}"#.to_string())).await;
        let client =
            ProxmoxClient::with_base_url(url, &password_cluster(), &fast_network(2)).unwrap();

        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ProxtopError::Authentication(_)), "{}", err);
        assert_eq!(server::count(&requests, "POST /api2/json/access/ticket"), 1);
        assert_eq!(server::count(&requests, "GET"), 0);
    }
}
