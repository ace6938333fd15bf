//! All the database models live here.

pub use chat::*;
pub use user::*;

mod chat;
mod user;
