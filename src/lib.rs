//! Client core for a forum with real-time private messaging.
//!
//! The crate keeps one authenticated push channel (a websocket) open to the
//! forum server, reconnecting after unexpected closures, and routes the
//! events it receives into a single shared [`state::AppState`]. REST calls
//! cover everything the channel does not.
//!
//! Entry point is [`controller::Controller`]: build it with a
//! [`connection::Connector`] and an [`api::ForumApi`], spawn it, and drive it
//! through the returned [`controller::ControllerHandle`].

pub mod api;
pub mod config;
pub mod connection;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod state;
pub mod timer;
pub mod types;
