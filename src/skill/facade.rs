//! Skill transport facade.
//!
//! [`SkillTransport`] is the one-call surface for handing an activity to a
//! remote skill: rewrite the endpoint to its WebSocket form, dial a fresh
//! connection with auth headers attached, serve the activity routes while
//! the skill works, post the activity, and tear the connection down no
//! matter how the exchange went.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::connection::SkillConnection;
use crate::error::{Result, TransportError};
use crate::protocol::StreamingRequest;
use crate::skill::context::{ActivityCodec, TokenProvider, TurnContext};
use crate::skill::routes::activity_routes;
use crate::transport::Connector;

/// Tracing target for forward latency events.
const METRICS_TARGET: &str = "skillwire::metrics";

/// Forwards activities to remote skills over per-forward connections.
pub struct SkillTransport<C: ActivityCodec> {
    codec: Arc<C>,
    connector: Arc<dyn Connector>,
    token_provider: Arc<dyn TokenProvider>,
    channel_id: String,
    skill_name: String,
    extra_headers: Vec<(String, String)>,
}

impl<C: ActivityCodec + 'static> SkillTransport<C> {
    /// Create a transport.
    pub fn new(
        codec: Arc<C>,
        connector: Arc<dyn Connector>,
        token_provider: Arc<dyn TokenProvider>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            codec,
            connector,
            token_provider,
            channel_id: channel_id.into(),
            skill_name: String::new(),
            extra_headers: Vec::new(),
        }
    }

    /// Name used to key metric events for this skill.
    pub fn with_skill_name(mut self, name: impl Into<String>) -> Self {
        self.skill_name = name.into();
        self
    }

    /// Attach an extra header to every connection handshake, alongside the
    /// authorization and channel id headers.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Forward an activity to the skill at `endpoint` and serve its
    /// callbacks until it answers.
    ///
    /// Returns the end-of-conversation activity the skill posted back, if
    /// any. The connection is dialed fresh for this forward and closed
    /// before returning, on success and on every error path.
    ///
    /// # Errors
    ///
    /// Fails on a blank endpoint, credential or dial failure, a dropped
    /// connection, or a non-success response status.
    pub async fn forward(
        &self,
        turn: Arc<dyn TurnContext<Activity = C::Activity>>,
        endpoint: &str,
        activity: &C::Activity,
    ) -> Result<Option<C::Activity>> {
        let url = ensure_websocket_url(endpoint)?;
        let token = self.token_provider.get_token().await?;
        let mut headers = self.extra_headers.clone();
        headers.push(("authorization".to_string(), format!("Bearer {token}")));
        headers.push(("channelid".to_string(), self.channel_id.clone()));

        let stream = self.connector.connect(&url, &headers).await?;

        let end_of_conversation = Arc::new(Mutex::new(None));
        let router = Arc::new(activity_routes(
            self.codec.clone(),
            turn,
            end_of_conversation.clone(),
        ));
        let connection = SkillConnection::connect(stream, router)?;

        let outcome = self.post_activity(&connection, &url, activity).await;
        connection.disconnect(Some("forward complete".to_string())).await;
        outcome?;

        let captured = end_of_conversation
            .lock()
            .map_err(|_| TransportError::HandlerFault("capture lock poisoned".into()))?
            .take();
        Ok(captured)
    }

    async fn post_activity(
        &self,
        connection: &SkillConnection,
        endpoint: &str,
        activity: &C::Activity,
    ) -> Result<()> {
        let body = self.codec.to_bytes(activity)?;
        let path = format!("/activities/{}", self.codec.activity_id(activity));

        let started = Instant::now();
        let response = connection.request(StreamingRequest::post(path, body)).await?;
        tracing::info!(
            target: METRICS_TARGET,
            skill = %self.skill_name,
            endpoint = %endpoint,
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = response.status,
            "activity forwarded to skill"
        );

        if !response.is_success() {
            return Err(TransportError::RequestFailed {
                status: response.status,
            });
        }
        Ok(())
    }
}

/// Rewrite an HTTP(S) endpoint to its WebSocket scheme.
///
/// `https://` becomes `wss://` and `http://` becomes `ws://`, matching the
/// scheme case-insensitively and leaving the remainder untouched. URLs with
/// any other scheme pass through unchanged.
///
/// # Errors
///
/// [`TransportError::InvalidEndpoint`] for an empty or blank URL.
pub fn ensure_websocket_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(TransportError::InvalidEndpoint);
    }

    let lower = url.to_ascii_lowercase();
    let rewritten = if lower.starts_with("https://") {
        format!("wss://{}", &url["https://".len()..])
    } else if lower.starts_with("http://") {
        format!("ws://{}", &url["http://".len()..])
    } else {
        url.to_string()
    };
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_becomes_wss() {
        assert_eq!(
            ensure_websocket_url("https://skill.example.com/api").unwrap(),
            "wss://skill.example.com/api"
        );
    }

    #[test]
    fn test_http_becomes_ws() {
        assert_eq!(
            ensure_websocket_url("http://localhost:3980/api").unwrap(),
            "ws://localhost:3980/api"
        );
    }

    #[test]
    fn test_scheme_match_is_case_insensitive() {
        assert_eq!(
            ensure_websocket_url("HTTPS://Skill.Example.com/Api").unwrap(),
            "wss://Skill.Example.com/Api"
        );
    }

    #[test]
    fn test_other_schemes_pass_through() {
        assert_eq!(
            ensure_websocket_url("wss://already.example.com").unwrap(),
            "wss://already.example.com"
        );
        assert_eq!(ensure_websocket_url("ftp://x").unwrap(), "ftp://x");
    }

    #[test]
    fn test_blank_url_is_invalid() {
        assert!(matches!(
            ensure_websocket_url(""),
            Err(TransportError::InvalidEndpoint)
        ));
        assert!(matches!(
            ensure_websocket_url("   "),
            Err(TransportError::InvalidEndpoint)
        ));
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        assert_eq!(
            ensure_websocket_url("  https://skill.example.com ").unwrap(),
            "wss://skill.example.com"
        );
    }
}
