//! Skill forwarding layer - facade, activity routes, and host collaborator
//! traits.

mod context;
mod facade;
mod routes;

pub use context::{ActivityCodec, TokenProvider, TurnContext};
pub use facade::{ensure_websocket_url, SkillTransport};
pub use routes::activity_routes;
