//! # retrowsa
//!
//! Decoder for the WSA animation container used by Dune II.  Each frame is
//! stored as an LCW (format80) compressed XOR delta (format40) against the
//! frame before it.
//!
//! * `lcw` and `xor_delta` are pure buffer transforms
//! * `wsa` detects the container and rebuilds the frame chain
//!
//! ```no_run
//! use retrowsa::{SpriteLoader,SpriteFrame,wsa::WsaLoader};
//! let mut f = std::fs::File::open("intro.wsa").unwrap();
//! if let Some(frames) = WsaLoader::default().try_parse_sprite(&mut f).unwrap() {
//!     println!("{} frames of {:?}",frames.len(),frames[0].size());
//! }
//! ```

mod tools;
pub mod lcw;
pub mod xor_delta;
pub mod wsa;

use std::io::{Read,Seek};

/// Decoding Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("unexpected end of compressed data")]
    UnexpectedEnd,
    #[error("bad command {cmd:#04x} at {pos}")]
    BadCommand { cmd: u8, pos: usize },
    #[error("output needs {needed} bytes but capacity is {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },
    #[error("bad offset table: {0}")]
    BadOffsetTable(String),
    #[error("frame of {0} bytes is too large")]
    FrameTooLarge(usize),
    #[error("animation of {0} bytes is too large")]
    AnimationTooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

/// A decoded image with one palette index per pixel.
pub trait SpriteFrame {
    /// (width,height) of the pixel data
    fn size(&self) -> (usize,usize);
    /// (width,height) of the frame the pixels are placed in
    fn frame_size(&self) -> (usize,usize) {
        self.size()
    }
    /// placement of the pixels within the frame
    fn offset(&self) -> (f32,f32) {
        (0.0,0.0)
    }
    /// row major palette indices, `width*height` bytes
    fn data(&self) -> &[u8];
    fn disable_export_padding(&self) -> bool {
        false
    }
}

/// A sprite format that can recognize a stream and turn it into frames.
/// Callers typically try several loaders in turn until one returns frames.
pub trait SpriteLoader {
    type Frame: SpriteFrame;
    /// Is the stream in this format.  Never fails, and leaves the stream position unchanged.
    fn detect<R: Read + Seek>(&self, stream: &mut R) -> bool;
    /// Returns `Ok(None)` if the stream is not in this format, or an error
    /// if it is in this format but is corrupt.
    fn try_parse_sprite<R: Read + Seek>(&self, stream: &mut R) -> Result<Option<Vec<Self::Frame>>,Error>;
}
