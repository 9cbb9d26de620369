//! Activity routes served to the remote skill.
//!
//! While a forward is in flight the remote skill drives the conversation by
//! sending requests back over the same connection:
//!
//! - `POST /activities/{activityId}` delivers a new activity
//! - `PUT /activities/{activityId}` replaces one
//! - `DELETE /activities/{activityId}` removes one
//!
//! A posted activity that signals end-of-conversation is captured for the
//! caller instead of terminating the connection here; the facade decides
//! what to do with it once the forward completes.

use std::sync::{Arc, Mutex};

use crate::error::TransportError;
use crate::router::{RequestRouter, RouteContext};
use crate::skill::context::{ActivityCodec, TurnContext};

/// Build the router handling the remote skill's activity requests.
pub fn activity_routes<C>(
    codec: Arc<C>,
    turn: Arc<dyn TurnContext<Activity = C::Activity>>,
    end_of_conversation: Arc<Mutex<Option<C::Activity>>>,
) -> RequestRouter
where
    C: ActivityCodec + 'static,
{
    let mut router = RequestRouter::new();

    {
        let codec = codec.clone();
        let turn = turn.clone();
        router.route(
            "POST",
            "/activities/{activityId}",
            move |ctx: RouteContext| {
                let codec = codec.clone();
                let turn = turn.clone();
                let end_of_conversation = end_of_conversation.clone();
                async move {
                    let activity = codec.from_bytes(ctx.body())?;
                    let resource_id = turn.send_activity(&activity).await?;
                    if codec.is_end_of_conversation(&activity) {
                        *end_of_conversation
                            .lock()
                            .map_err(|_| TransportError::HandlerFault("capture lock poisoned".into()))? =
                            Some(activity);
                    }
                    Ok(resource_body(&resource_id))
                }
            },
        );
    }

    {
        let codec = codec.clone();
        let turn = turn.clone();
        router.route(
            "PUT",
            "/activities/{activityId}",
            move |ctx: RouteContext| {
                let codec = codec.clone();
                let turn = turn.clone();
                async move {
                    let activity = codec.from_bytes(ctx.body())?;
                    turn.update_activity(&activity).await?;
                    Ok(resource_body(codec.activity_id(&activity)))
                }
            },
        );
    }

    router.route(
        "DELETE",
        "/activities/{activityId}",
        move |ctx: RouteContext| {
            let turn = turn.clone();
            async move {
                let id = ctx
                    .param("activityId")
                    .ok_or_else(|| TransportError::HandlerFault("missing activityId".into()))?
                    .to_string();
                turn.delete_activity(&id).await?;
                Ok(Vec::new())
            }
        },
    );

    router
}

fn resource_body(id: &str) -> Vec<u8> {
    serde_json::json!({ "id": id }).to_string().into_bytes()
}
