pub mod handlers;
pub mod router;

pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";
