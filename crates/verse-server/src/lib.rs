pub mod client;
pub mod handlers;
pub mod publisher;
pub mod rpc;
pub mod server;

pub use handlers::HandlerState;
pub use server::{start, ServerConfig, ServerHandle};
