//! serenity adapter: implements [`pinbot_core::Platform`] over the Discord
//! HTTP API and feeds gateway events into the registry and relay engine.

pub mod convert;
pub mod handler;
pub mod platform;

pub use handler::Handler;
pub use platform::SerenityPlatform;
