//! End-to-end tests over in-memory duplex streams.
//!
//! A fake remote skill lives on one end of a `tokio::io::duplex` pair and
//! the host transport on the other, exercising the full stack: facade,
//! connection, framing, routing, and teardown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::DuplexStream;

use skillwire::{
    ActivityCodec, Connector, Duplex, RequestRouter, Result, RouteContext, SkillConnection,
    SkillTransport, StreamingRequest, TokenProvider, TransportError, TurnContext,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestActivity {
    id: String,
    kind: String,
    text: String,
}

impl TestActivity {
    fn message(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: "message".to_string(),
            text: text.to_string(),
        }
    }

    fn end_of_conversation(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: "endOfConversation".to_string(),
            text: String::new(),
        }
    }
}

struct JsonCodec;

impl ActivityCodec for JsonCodec {
    type Activity = TestActivity;

    fn to_bytes(&self, activity: &TestActivity) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(activity)?)
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<TestActivity> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn activity_id<'a>(&self, activity: &'a TestActivity) -> &'a str {
        &activity.id
    }

    fn is_end_of_conversation(&self, activity: &TestActivity) -> bool {
        activity.kind == "endOfConversation"
    }
}

#[derive(Default)]
struct RecordingTurn {
    sent: Mutex<Vec<TestActivity>>,
}

#[async_trait]
impl TurnContext for RecordingTurn {
    type Activity = TestActivity;

    async fn send_activity(&self, activity: &TestActivity) -> Result<String> {
        self.sent.lock().unwrap().push(activity.clone());
        Ok(format!("resource-{}", activity.id))
    }

    async fn update_activity(&self, _activity: &TestActivity) -> Result<()> {
        Ok(())
    }

    async fn delete_activity(&self, _activity_id: &str) -> Result<()> {
        Ok(())
    }
}

struct StaticToken;

#[async_trait]
impl TokenProvider for StaticToken {
    async fn get_token(&self) -> Result<String> {
        Ok("test-token".to_string())
    }
}

/// Hands out a pre-made duplex half and records what the facade dialed.
struct DuplexConnector {
    stream: Mutex<Option<DuplexStream>>,
    dialed: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl DuplexConnector {
    fn new(stream: DuplexStream) -> Arc<Self> {
        Arc::new(Self {
            stream: Mutex::new(Some(stream)),
            dialed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<Box<dyn Duplex>> {
        self.dialed
            .lock()
            .unwrap()
            .push((url.to_string(), headers.to_vec()));
        let stream = self
            .stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::disconnected("no stream left to hand out"))?;
        Ok(Box::new(stream))
    }
}

type ConnectionSlot = Arc<Mutex<Option<Arc<SkillConnection>>>>;

/// Start a fake skill on `stream`: every posted activity is answered by
/// posting an end-of-conversation activity back to the host first.
fn spawn_skill(stream: DuplexStream) -> Arc<SkillConnection> {
    let slot: ConnectionSlot = Arc::new(Mutex::new(None));

    let mut router = RequestRouter::new();
    let handler_slot = slot.clone();
    router.route(
        "POST",
        "/activities/{activityId}",
        move |_ctx: RouteContext| {
            let slot = handler_slot.clone();
            async move {
                let connection = slot.lock().unwrap().clone().unwrap();
                let eoc = TestActivity::end_of_conversation("eoc-1");
                let response = connection
                    .request(StreamingRequest::post(
                        "/activities/eoc-1",
                        serde_json::to_vec(&eoc)?,
                    ))
                    .await?;
                assert!(response.is_success());
                Ok(b"{}".to_vec())
            }
        },
    );

    let connection = SkillConnection::connect(stream, Arc::new(router)).unwrap();
    *slot.lock().unwrap() = Some(connection.clone());
    connection
}

fn transport(connector: Arc<DuplexConnector>) -> SkillTransport<JsonCodec> {
    SkillTransport::new(Arc::new(JsonCodec), connector, Arc::new(StaticToken), "test")
}

#[tokio::test]
async fn test_forward_returns_end_of_conversation() {
    let (host_stream, skill_stream) = tokio::io::duplex(64 * 1024);
    let _skill = spawn_skill(skill_stream);

    let connector = DuplexConnector::new(host_stream);
    let transport = transport(connector.clone());
    let turn = Arc::new(RecordingTurn::default());

    let activity = TestActivity::message("m1", "hello skill");
    let eoc = transport
        .forward(turn.clone(), "https://skill.example.com/api", &activity)
        .await
        .unwrap();

    assert_eq!(eoc.unwrap().id, "eoc-1");
    // The skill's callback went through the host's turn context.
    let sent = turn.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, "endOfConversation");
}

#[tokio::test]
async fn test_forward_dials_websocket_url_with_auth_headers() {
    let (host_stream, skill_stream) = tokio::io::duplex(64 * 1024);
    let _skill = spawn_skill(skill_stream);

    let connector = DuplexConnector::new(host_stream);
    let transport = transport(connector.clone())
        .with_skill_name("echo")
        .with_header("x-trace", "abc");

    transport
        .forward(
            Arc::new(RecordingTurn::default()),
            "https://skill.example.com/api",
            &TestActivity::message("m1", "hi"),
        )
        .await
        .unwrap();

    let dialed = connector.dialed.lock().unwrap();
    let (url, headers) = &dialed[0];
    assert_eq!(url, "wss://skill.example.com/api");
    assert!(headers
        .iter()
        .any(|(k, v)| k == "authorization" && v == "Bearer test-token"));
    assert!(headers.iter().any(|(k, v)| k == "channelid" && v == "test"));
    assert!(headers.iter().any(|(k, v)| k == "x-trace" && v == "abc"));
}

#[tokio::test]
async fn test_forward_to_unrouted_skill_fails_with_status() {
    let (host_stream, skill_stream) = tokio::io::duplex(64 * 1024);
    // Skill with no routes at all: every request comes back 404.
    let _skill = SkillConnection::connect(skill_stream, Arc::new(RequestRouter::new())).unwrap();

    let connector = DuplexConnector::new(host_stream);
    let transport = transport(connector);

    let result = transport
        .forward(
            Arc::new(RecordingTurn::default()),
            "https://skill.example.com/api",
            &TestActivity::message("m1", "hi"),
        )
        .await;

    assert!(matches!(
        result,
        Err(TransportError::RequestFailed { status: 404 })
    ));
}

#[tokio::test]
async fn test_blank_endpoint_never_dials() {
    let (host_stream, _skill_stream) = tokio::io::duplex(64);
    let connector = DuplexConnector::new(host_stream);
    let transport = transport(connector.clone());

    let result = transport
        .forward(
            Arc::new(RecordingTurn::default()),
            "   ",
            &TestActivity::message("m1", "hi"),
        )
        .await;

    assert!(matches!(result, Err(TransportError::InvalidEndpoint)));
    assert!(connector.dialed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_is_closed_after_forward() {
    let (host_stream, skill_stream) = tokio::io::duplex(64 * 1024);
    let skill = spawn_skill(skill_stream);

    let connector = DuplexConnector::new(host_stream);
    let transport = transport(connector);

    transport
        .forward(
            Arc::new(RecordingTurn::default()),
            "https://skill.example.com/api",
            &TestActivity::message("m1", "hi"),
        )
        .await
        .unwrap();

    // The host hangs up after the exchange; the skill side observes EOF.
    let mut settled = false;
    for _ in 0..50 {
        if !skill.is_connected() {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(settled, "skill side never observed the hangup");
}

#[tokio::test]
async fn test_dropped_skill_fails_forward() {
    let (host_stream, skill_stream) = tokio::io::duplex(64 * 1024);
    drop(skill_stream);

    let connector = DuplexConnector::new(host_stream);
    let transport = transport(connector);

    let result = transport
        .forward(
            Arc::new(RecordingTurn::default()),
            "https://skill.example.com/api",
            &TestActivity::message("m1", "hi"),
        )
        .await;

    assert!(matches!(result, Err(TransportError::Disconnected { .. })));
}
