pub mod client;
pub mod protocol;
pub mod server;
pub mod signing;

pub use client::ServiceClient;
pub use server::{serve_connection, RequestHandler};
pub use signing::SigningKey;
