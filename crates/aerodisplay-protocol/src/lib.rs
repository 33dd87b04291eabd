//! # aerodisplay-protocol
//!
//! Message types and codec for the serial link to the controller.
//!
//! The link carries one JSON object per line in both directions.

pub mod codec;
pub mod messages;

pub use codec::*;
pub use messages::*;
