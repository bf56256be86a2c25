//! Wire protocol spoken by the measured device.
//!
//! There is no length field anywhere in the stream: two-byte markers are the
//! only framing. [`Marker`] recognises them, [`FrameDecoder`] turns the raw
//! byte stream into capture bytes and protocol events.

mod framer;
mod marker;

pub use framer::{Decoded, FrameDecoder, FrameEvent, FrameState};
pub use marker::{Marker, MARKER_PREFIX};
