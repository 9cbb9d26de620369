//! Host-side collaborator traits.
//!
//! The transport is generic over the host's activity model: it never
//! inspects activity payloads itself, it goes through an [`ActivityCodec`].
//! Turn handling and credential acquisition are likewise abstracted so the
//! transport carries no bot or auth logic.

use async_trait::async_trait;

use crate::error::Result;

/// Serializes the host's activity type for the wire and answers the two
/// questions the transport needs: an activity's id and whether it ends the
/// conversation.
pub trait ActivityCodec: Send + Sync {
    /// Host activity type. Opaque to the transport.
    type Activity: Send + Sync + 'static;

    /// Serialize an activity into a request body.
    fn to_bytes(&self, activity: &Self::Activity) -> Result<Vec<u8>>;

    /// Deserialize an activity from a request body.
    fn from_bytes(&self, bytes: &[u8]) -> Result<Self::Activity>;

    /// The activity's id, used in request paths.
    fn activity_id<'a>(&self, activity: &'a Self::Activity) -> &'a str;

    /// Whether the activity signals the end of the conversation.
    fn is_end_of_conversation(&self, activity: &Self::Activity) -> bool;
}

/// Host-side turn operations invoked for activities the remote skill sends
/// back over the connection.
#[async_trait]
pub trait TurnContext: Send + Sync {
    /// Host activity type. Opaque to the transport.
    type Activity: Send + Sync + 'static;

    /// Deliver a new activity to the host. Returns the assigned resource id.
    async fn send_activity(&self, activity: &Self::Activity) -> Result<String>;

    /// Replace a previously sent activity.
    async fn update_activity(&self, activity: &Self::Activity) -> Result<()>;

    /// Remove a previously sent activity by id.
    async fn delete_activity(&self, activity_id: &str) -> Result<()>;
}

/// Supplies the bearer credential attached to the connection handshake.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a token for the outbound connection.
    async fn get_token(&self) -> Result<String>;
}
