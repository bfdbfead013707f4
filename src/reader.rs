//! One transport read at a time into the framer.
use log::trace;

use crate::{
    framer::{Framer, FramerStats},
    transport::Transport,
    Frame, ProtocolFilter, TransportError,
};

/// Default number of bytes requested per transport read
pub const DEFAULT_READ_SIZE: usize = 4096;

/// Pulls bytes from a [`Transport`] into a [`Framer`], one frame at a time.
pub struct FrameReader {
    framer: Framer,
    read_size: usize,
}

impl FrameReader {
    /// Create a reader emitting the protocols in `filter`.
    pub fn new(filter: ProtocolFilter, read_size: usize) -> Self {
        Self {
            framer: Framer::new(filter),
            read_size: read_size.max(1),
        }
    }

    /// Return the next frame. Frames already buffered are returned without
    /// touching the transport; otherwise one read is issued. `Ok(None)`
    /// means the read produced no complete frame yet.
    pub fn read_frame(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<Option<Frame>, TransportError> {
        if let Some(frame) = self.framer.next_frame() {
            return Ok(Some(frame));
        }
        let data = transport.read(self.read_size)?;
        if data.is_empty() {
            return Ok(None);
        }
        trace!("Read {} bytes from {}", data.len(), transport.describe());
        self.framer.push(&data);
        Ok(self.framer.next_frame())
    }

    /// Feed bytes obtained elsewhere.
    pub fn push(&mut self, data: &[u8]) {
        self.framer.push(data);
    }

    /// Frame counters
    pub fn stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// Change the protocol filter.
    pub fn set_filter(&mut self, filter: ProtocolFilter) {
        self.framer.set_filter(filter);
    }
}
