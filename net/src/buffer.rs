// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Packet buffer traits and the software [`FrameBuffer`].
//!
//! The I/O layer owns buffer memory; the pipeline only sees the
//! [`PacketBufferMut`] contract. Releasing a buffer back to its pool is
//! expressed by dropping it.

use std::fmt::Debug;

/// Largest frame any driver is expected to hand to the pipeline
/// (jumbo frame plus Ethernet and VLAN overhead).
pub const MAX_FRAME_LEN: usize = 9018;

/// Error returned when a buffer cannot grow to the requested length.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("frame buffer full: requested {requested} bytes, capacity {capacity}")]
pub struct BufferFull {
    /// Requested total length.
    pub requested: usize,
    /// Hard capacity of the buffer.
    pub capacity: usize,
}

/// Operations the pipeline needs from a mutable packet buffer.
///
/// `as_ref()`/`as_mut()` expose exactly the received frame bytes; the
/// buffer tracks the frame length, not its allocation size.
pub trait PacketBufferMut: AsRef<[u8]> + AsMut<[u8]> + Debug + Send + 'static {
    /// Shorten the frame to `len` bytes. No-op if already shorter.
    fn truncate(&mut self, len: usize);

    /// Grow the frame by `additional` zeroed tail bytes and return the full
    /// frame slice.
    fn grow(&mut self, additional: usize) -> Result<&mut [u8], BufferFull>;
}

/// A heap-backed frame buffer used by the software drivers and by tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Copy `frame` into a fresh buffer.
    pub fn from_frame(frame: &[u8]) -> Self {
        FrameBuffer {
            data: frame.to_vec(),
        }
    }

    /// An empty buffer with `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        FrameBuffer {
            data: vec![0; len],
        }
    }
}

impl AsRef<[u8]> for FrameBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for FrameBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl PacketBufferMut for FrameBuffer {
    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn grow(&mut self, additional: usize) -> Result<&mut [u8], BufferFull> {
        let requested = self.data.len() + additional;
        if requested > MAX_FRAME_LEN {
            return Err(BufferFull {
                requested,
                capacity: MAX_FRAME_LEN,
            });
        }
        self.data.resize(requested, 0);
        Ok(&mut self.data)
    }
}
