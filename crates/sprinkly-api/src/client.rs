// OpenSprinkler HTTP client
//
// Wraps `reqwest::Client` with the controller's URL scheme: every endpoint
// is a GET on `/<verb>` whose parameters travel in the query string, with
// the password appended as `pw`. Command endpoints answer `{"result": N}`;
// the status endpoint answers the full JSON document.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::result_code::ResultCode;
use crate::transport::TransportConfig;

/// Endpoint verbs understood by the controller firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, IntoStaticStr)]
pub enum Verb {
    /// All status data in one document.
    #[strum(serialize = "ja")]
    Status,
    /// Manually start or stop a station.
    #[strum(serialize = "cm")]
    ManualStation,
    /// Manually start a program.
    #[strum(serialize = "mp")]
    ManualProgram,
    /// Set per-board station disable bitmasks.
    #[strum(serialize = "cs")]
    StationDisable,
    /// Enable or disable a program.
    #[strum(serialize = "cp")]
    ProgramEnable,
    /// Change controller variables (enable flag, rain delay).
    #[strum(serialize = "cv")]
    ChangeVariables,
}

impl Verb {
    /// URL path segment, relative to the controller root.
    pub fn path(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    result: ResultCode,
}

/// Raw HTTP client for one OpenSprinkler controller.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct SprinklerClient {
    http: reqwest::Client,
    base_url: Url,
    password: SecretString,
    timeout_secs: u64,
}

impl std::fmt::Debug for SprinklerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SprinklerClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SprinklerClient {
    /// Create a client for `host` (`192.168.1.20`, `os.local:8080` or a full
    /// `http://` URL).
    pub fn new(
        host: &str,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let base_url = base_url_for(host)?;
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            password,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, password: SecretString) -> Self {
        Self {
            http,
            base_url,
            password,
            timeout_secs: 0,
        }
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch the full status document (`GET /ja`).
    pub async fn fetch_status(&self) -> Result<serde_json::Value, Error> {
        let body = self.get(Verb::Status, &[]).await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        // A rejected password yields a bare `{"result": 2}` instead of the document.
        if let Some(code) = bare_result(&value) {
            if !code.is_success() {
                return Err(Error::Device { code });
            }
        }

        Ok(value)
    }

    /// Send a command and check its `{result}` envelope.
    pub async fn send_command(&self, verb: Verb, params: &[(String, String)]) -> Result<(), Error> {
        let body = self.get(verb, params).await?;
        let response: CommandResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if response.result.is_success() {
            Ok(())
        } else {
            Err(Error::Device {
                code: response.result,
            })
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get(&self, verb: Verb, params: &[(String, String)]) -> Result<String, Error> {
        let url = self.base_url.join(verb.path())?;
        debug!(%verb, params = params.len(), "GET {}", url);

        let resp = self
            .http
            .get(url)
            .query(params)
            .query(&[("pw", self.password.expose_secret())])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }
}

/// Normalize a configured host into a base URL ending in `/`.
pub fn base_url_for(host: &str) -> Result<Url, Error> {
    let trimmed = host.trim().trim_end_matches('/');
    let full = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        format!("{trimmed}/")
    } else {
        format!("http://{trimmed}/")
    };
    Ok(Url::parse(&full)?)
}

/// `Some(code)` when the document is nothing but a `{result}` envelope.
fn bare_result(value: &serde_json::Value) -> Option<ResultCode> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get("result")?.as_i64().map(ResultCode::from)
}
