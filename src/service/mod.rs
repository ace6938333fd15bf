//! The business logic of palaver lives here.

pub use chat::*;

mod chat;
