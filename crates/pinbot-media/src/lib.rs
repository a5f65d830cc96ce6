//! Media helpers for relaying attachments under the platform upload ceiling.

pub mod error;
pub mod shrink;

pub use error::{Error, Result};
pub use shrink::{MAX_SHRINK_PASSES, SHRINK_STEP_PERCENT, Shrunk, shrink_to_fit};
