pub mod backend;
pub mod bundler;

pub use backend::{BackendClient, OutcomeReport, RecordBackend};
pub use bundler::{BundlerClient, SimulationMode, StatusResponse, SubmitResponse};

use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    constants::ERROR_BODY_PREVIEW_CHARS,
    error::{HttpErrorKind, RelayError},
};

/// HTTP collaborator a failure is attributed to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Peer {
    Relayer,
    Backend,
}

impl Peer {
    fn error(self, url: &Url, message: String, kind: HttpErrorKind) -> RelayError {
        match self {
            Peer::Relayer => RelayError::RelayerError {
                url: url.to_string(),
                message,
                kind,
            },
            Peer::Backend => RelayError::BackendError {
                url: url.to_string(),
                message,
                kind,
            },
        }
    }

    fn transport(self, url: &Url, error: &reqwest::Error) -> RelayError {
        match self {
            Peer::Relayer => RelayError::relayer(url, error),
            Peer::Backend => RelayError::backend(url, error),
        }
    }
}

/// Append a single path segment to a base URL, keeping any base path.
pub(crate) fn endpoint(base: &Url, segment: &str) -> Result<Url, RelayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RelayError::ConfigError {
            message: format!("{base} cannot be used as a base URL"),
        })?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// Send the request and return the body of a 2xx response.
///
/// Non-2xx responses carry the peer's `message`/`error` field when the body
/// has one.
pub(crate) async fn send(
    peer: Peer,
    url: &Url,
    request: reqwest::RequestBuilder,
) -> Result<String, RelayError> {
    let response = request.send().await.map_err(|e| peer.transport(url, &e))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| peer.transport(url, &e))?;

    if status.is_success() {
        return Ok(body);
    }

    let message = error_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
    Err(peer.error(
        url,
        message,
        HttpErrorKind::Status {
            status: status.as_u16(),
            body_preview: preview(&body),
        },
    ))
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    peer: Peer,
    url: &Url,
    request: reqwest::RequestBuilder,
) -> Result<T, RelayError> {
    let body = send(peer, url, request).await?;

    serde_json::from_str(&body).map_err(|e| {
        peer.error(
            url,
            format!("Failed to decode response: {e}, body: {}", preview(&body)),
            HttpErrorKind::Decode,
        )
    })
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    let message = value
        .get("message")
        .or_else(|| value.get("error").and_then(|e| e.get("message")))
        .or_else(|| value.get("error"))?;

    message.as_str().map(str::to_string)
}

fn preview(body: &str) -> String {
    if body.chars().count() > ERROR_BODY_PREVIEW_CHARS {
        let truncated: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let base = Url::parse("https://relay.example/api/v1").unwrap();
        assert_eq!(
            endpoint(&base, "submit").unwrap().as_str(),
            "https://relay.example/api/v1/submit"
        );

        let trailing = Url::parse("https://relay.example/api/").unwrap();
        assert_eq!(
            endpoint(&trailing, "link-hashes").unwrap().as_str(),
            "https://relay.example/api/link-hashes"
        );
    }

    #[test]
    fn relayer_message_is_extracted() {
        assert_eq!(
            error_message(r#"{"message":"AA25 invalid account nonce"}"#).as_deref(),
            Some("AA25 invalid account nonce")
        );
        assert_eq!(
            error_message(r#"{"error":{"message":"paymaster rejected"}}"#).as_deref(),
            Some("paymaster rejected")
        );
        assert_eq!(error_message(r#"{"error":"bad op"}"#).as_deref(), Some("bad op"));
        assert_eq!(error_message("<html>502</html>"), None);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(ERROR_BODY_PREVIEW_CHARS + 10);
        assert_eq!(preview(&body).len(), ERROR_BODY_PREVIEW_CHARS + 3);
    }
}
