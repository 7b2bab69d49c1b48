//! Frame-level I/O over an async byte stream.
//!
//! [`FrameStream`] owns the reassembly buffer: raw bytes arrive in whatever
//! pieces the transport hands over and come out as whole frames.

mod stream;

pub use stream::{FrameStream, Pull};
