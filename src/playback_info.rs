use std::io;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::notice::Notice;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlaybackInfoRequest {
    pub(crate) server_address: String,
    pub(crate) api_key: String,
    pub(crate) user_id: String,
    pub(crate) item_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ResolveError {
    #[error("server rejected the API credentials (HTTP {0})")]
    Unauthorized(u16),
    #[error("PlaybackInfo request failed with HTTP status {status}{}", detail_suffix(.body))]
    Status { status: u16, body: String },
    #[error("PlaybackInfo request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Transport(String),
    #[error("malformed PlaybackInfo response: {0}")]
    Protocol(String),
    #[error("PlaybackInfo lookup ended without reporting a result")]
    Aborted,
}

fn detail_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

impl ResolveError {
    /// Failures that get their own user-visible notice; the rest only end
    /// in the generic "could not determine path" message.
    pub(crate) fn notice(&self) -> Option<Notice> {
        match self {
            Self::Unauthorized(_) => Some(Notice::Unauthorized),
            Self::Transport(_) => Some(Notice::NetworkError),
            Self::Timeout => Some(Notice::Timeout),
            Self::Status { .. } | Self::Protocol(_) | Self::Aborted => None,
        }
    }
}

pub(crate) trait PlaybackInfoClient: Send + Sync {
    /// Server path of the item's preferred media source, `None` if it has none.
    fn media_path(&self, request: &PlaybackInfoRequest) -> Result<Option<String>, ResolveError>;
}

/// Client and device names sent in the `X-Emby-Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct ClientIdentity {
    pub(crate) name: String,
    pub(crate) device: String,
    pub(crate) device_id: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            name: "jellympv".to_string(),
            device: "jellympv-cli".to_string(),
            device_id: format!("jellympv-{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientIdentity {
    pub(crate) fn authorization_header(&self, api_key: &str) -> String {
        format!(
            r#"MediaBrowser Client="{}", Device="{}", DeviceId="{}", Version="{}", Token="{}""#,
            self.name,
            self.device,
            self.device_id,
            env!("CARGO_PKG_VERSION"),
            api_key
        )
    }
}

pub(crate) struct HttpPlaybackInfoClient {
    agent: ureq::Agent,
    identity: ClientIdentity,
}

impl HttpPlaybackInfoClient {
    pub(crate) fn new(identity: ClientIdentity) -> Self {
        Self::with_timeout(identity, REQUEST_TIMEOUT)
    }

    pub(crate) fn with_timeout(identity: ClientIdentity, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, identity }
    }
}

pub(crate) fn playback_info_url(request: &PlaybackInfoRequest) -> String {
    format!(
        "{}/Items/{}/PlaybackInfo",
        request.server_address.trim_end_matches('/'),
        utf8_percent_encode(&request.item_id, PATH_SEGMENT)
    )
}

impl PlaybackInfoClient for HttpPlaybackInfoClient {
    fn media_path(&self, request: &PlaybackInfoRequest) -> Result<Option<String>, ResolveError> {
        let url = playback_info_url(request);
        debug!(item_id = %request.item_id, %url, "requesting PlaybackInfo");

        let response = self
            .agent
            .post(&url)
            .query("UserId", &request.user_id)
            .query("api_key", &request.api_key)
            .set("Content-Type", "application/json")
            .set(
                "X-Emby-Authorization",
                &self.identity.authorization_header(&request.api_key),
            )
            .send_string("{}");

        match response {
            Ok(response) => {
                let body = response
                    .into_string()
                    .map_err(|err| ResolveError::Protocol(format!("response decode failed: {err}")))?;
                select_media_path(&body)
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().ok().unwrap_or_default();
                let body = body.trim().chars().take(240).collect::<String>();
                warn!(status, item_id = %request.item_id, %body, "PlaybackInfo request rejected");
                if status == 401 || status == 403 {
                    Err(ResolveError::Unauthorized(status))
                } else {
                    Err(ResolveError::Status { status, body })
                }
            }
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Err(ResolveError::Timeout)
                } else {
                    Err(ResolveError::Transport(transport.to_string()))
                }
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        })
}

#[derive(Debug, Deserialize)]
struct PlaybackInfoResponse {
    #[serde(rename = "MediaSources", default)]
    media_sources: Option<Vec<MediaSource>>,
}

#[derive(Debug, Deserialize)]
struct MediaSource {
    #[serde(rename = "Path", default)]
    path: Option<String>,
}

/// First source with a non-blank path, else whatever the first source carries.
pub(crate) fn select_media_path(body: &str) -> Result<Option<String>, ResolveError> {
    let parsed: PlaybackInfoResponse =
        serde_json::from_str(body).map_err(|err| ResolveError::Protocol(err.to_string()))?;
    let sources = parsed.media_sources.unwrap_or_default();

    let has_path = |source: &&MediaSource| {
        source
            .path
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty())
    };
    let chosen = sources.iter().find(has_path).or_else(|| sources.first());
    Ok(chosen
        .and_then(|source| source.path.clone())
        .filter(|path| !path.trim().is_empty()))
}
