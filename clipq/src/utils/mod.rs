//! Utility functions and supporting infrastructure.
//!
//! Provides the page checksum, little-endian field reading and the error
//! types shared by the synchronizer, demultiplexer and playback layers.

pub mod bitstream_io;
pub mod crc;
pub mod errors;
