mod handlers;
mod health;
mod routes;

pub use handlers::{SendMessageRequest, SendMessageResponse, WebPushRequest, WebPushResponse};
pub use routes::api_routes;
