//! Terminal-free models. Everything here takes `now: Instant` explicitly and
//! talks to storage, audio and the network only through ports.

pub mod chat;
pub mod focus;
pub mod memory;
pub mod quiz;
pub mod session;
pub mod window;
pub mod wm;
pub mod word;
