#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! ### Bitstream Organization
//!
//! **External Structure**: Pages framed by the `OggS` capture pattern, each
//! protected by a CRC-32 over the whole page.
//! **Internal Structure**: Lacing values split page bodies into segments;
//! segments join into packets, which may span pages.
//!
//! Every clip starts with three header packets that configure the codec,
//! followed by audio packets.
//!
//! ### Error Recovery
//!
//! Corrupt regions and lost pages surface as holes. While the headers are
//! read a hole ends the clip; afterwards holes are logged and skipped.
//!
//! ## Quick Start
//!
//! 1. Locate pages with [`process::sync::PageSynchronizer`]
//! 2. Reassemble packets with [`process::demux::StreamDemuxer`]
//! 3. Decode a whole clip into an [`sink::AudioSink`] with
//!    [`process::decode::play_clip`], or queue clips on a [`player::Player`]
//!
//! ```rust,no_run
//! use clipq::process::{Pull, demux::StreamDemuxer, sync::PageSynchronizer};
//!
//! let mut sync = PageSynchronizer::default();
//! let mut demux = StreamDemuxer::default();
//!
//! let data = std::fs::read("clip.ogg")?;
//! sync.push_bytes(&data);
//!
//! while let Pull::Found(page) = sync.next_page() {
//!     demux.accept_page(&page);
//!     loop {
//!         match demux.next_packet() {
//!             Pull::Found(packet) => println!("packet {}: {} bytes", packet.packetno, packet.data.len()),
//!             Pull::Corrupt(hole) => eprintln!("{hole}"),
//!             Pull::NeedMoreData => break,
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Processing stages of the decode pipeline.
///
/// 1. **Synchronization** ([`process::sync`]): Finds checksum-valid pages in
///    arbitrarily split input.
///
/// 2. **Demultiplexing** ([`process::demux`]): Turns the pages of one stream
///    into packets.
///
/// 3. **Decoding** ([`process::header`], [`process::decode`]): Configures the
///    codec and runs the per-clip decode loop.
pub mod process;

/// Data structures of the container and the decoded stream.
///
/// - **Pages** ([`structs::page`])
/// - **Packets** ([`structs::packet`])
/// - **Stream context** ([`structs::stream`])
pub mod structs;

/// The sequential clip player.
pub mod player;

/// Codec capability consumed by the pipeline.
pub mod codec;

/// Audio output capability consumed by the pipeline.
pub mod sink;

/// Checksums, bit reading and error types.
pub mod utils;

#[cfg(test)]
pub(crate) mod fixtures;
