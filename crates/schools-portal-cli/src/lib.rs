//! schools-portal front ends: chat-style dispatcher, REPL, and rendering
//! on top of the `schools-portal` client.

pub mod chat;
pub mod render;
pub mod repl;
pub mod sessions;

pub use chat::ChatFrontEnd;
pub use sessions::{UserId, UserSession, UserSessions};
