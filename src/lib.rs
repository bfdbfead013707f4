#![deny(missing_docs)]
//! # GNSS Stream
//! Receiver side plumbing for u-blox style GNSS streams.
//!
//! Bytes arrive over a serial port, a TCP or UDP socket, or a recorded
//! file. A [`Framer`] splits the interleaved UBX, NMEA and RTCM3 traffic
//! into validated [`Frame`]s, a [`StreamHandler`] runs the read loop on a
//! background thread and writes queued commands back to the receiver, and
//! a [`Dispatcher`] folds decoded messages into one [`GnssStatus`].
//!
//! ```no_run
//! use gnss_stream::{Dispatcher, SharedStatus, StreamHandler, StreamOptions, TransportConfig};
//! use std::collections::HashMap;
//!
//! let settings = HashMap::from([
//!     ("kind".to_string(), "file".to_string()),
//!     ("path".to_string(), "capture.ubx".to_string()),
//! ]);
//! let config = TransportConfig::from_settings(&settings).unwrap();
//! let options = StreamOptions::default();
//! let mut handle = StreamHandler::new(options.clone()).start(&config).unwrap();
//! let mut dispatcher = Dispatcher::new(SharedStatus::new(), &options)
//!     .with_commands(handle.commands());
//! for frame in handle.frames().iter().take(100) {
//!     dispatcher.process(&frame);
//! }
//! println!("{:?}", dispatcher.status().snapshot().fix);
//! handle.stop(std::time::Duration::from_secs(1)).unwrap();
//! ```
mod error;
mod gnss;
mod protocol;

pub mod command;
pub mod framer;
pub mod handler;
pub mod nmea;
pub mod reader;
pub mod rtcm;
pub mod status;
pub mod stream;
pub mod transport;
pub mod ubx;

pub use command::CommandQueue;
pub use error::{ConnectionError, ParseError, StreamError, TransportError};
pub use framer::Framer;
pub use gnss::GnssId;
pub use handler::Dispatcher;
pub use protocol::{Frame, Message, Protocol, ProtocolFilter};
pub use reader::FrameReader;
pub use status::{FixType, GnssStatus, SharedStatus};
pub use stream::{StreamEvent, StreamHandle, StreamHandler, StreamOptions};
pub use transport::{Transport, TransportConfig};
