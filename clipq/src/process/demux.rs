use std::collections::VecDeque;

use log::{debug, trace};

use crate::process::Pull;
use crate::structs::packet::Packet;
use crate::structs::page::{CONTINUE_LACING, Page};
use crate::utils::errors::DemuxError;

/// What the demultiplexer did with a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// The page belongs to the open stream and its segments were taken.
    Accepted,
    /// The page belongs to another logical stream.
    Ignored,
    /// The page belongs to the open stream but could not be used; a hole
    /// was queued in its place.
    Rejected,
}

#[derive(Debug)]
enum Pending {
    Packet {
        data: Vec<u8>,
        granule_position: Option<i64>,
        eos: bool,
    },
    Hole(DemuxError),
}

/// Reassembles packets of a single logical stream from its pages.
///
/// The first accepted page fixes the serial number for the lifetime of the
/// demultiplexer; pages of any other stream are ignored. Packets may span
/// pages. Lost or reordered pages surface as one [`Pull::Corrupt`] at the
/// position in the packet sequence where data went missing.
#[derive(Debug, Default)]
pub struct StreamDemuxer {
    serial: Option<u32>,
    expected_sequence: Option<u32>,
    partial: Vec<u8>,
    in_packet: bool,
    ready: VecDeque<Pending>,
    next_packetno: u64,
    pages_accepted: u64,
    pages_ignored: u64,
    packets_out: u64,
    holes: u64,
    eos_seen: bool,
}

impl StreamDemuxer {
    pub fn accept_page(&mut self, page: &Page) -> Accept {
        match self.serial {
            None => {
                debug!("Opened logical stream {:#010X}", page.serial());
                self.serial = Some(page.serial());
            }
            Some(serial) if serial != page.serial() => {
                debug!(
                    "Ignoring page {} of foreign stream {:#010X}",
                    page.sequence(),
                    page.serial()
                );
                self.pages_ignored += 1;
                return Accept::Ignored;
            }
            Some(_) => {}
        }

        if page.header.version != 0 {
            // The page still holds its place in the sequence; only its
            // segments are lost.
            self.expected_sequence = Some(page.sequence().wrapping_add(1));
            self.queue_hole(DemuxError::UnsupportedVersion(page.header.version));
            return Accept::Rejected;
        }

        if let Some(expected) = self.expected_sequence {
            if page.sequence() != expected {
                self.queue_hole(DemuxError::SequenceGap {
                    expected,
                    found: page.sequence(),
                });
            }
        }
        self.expected_sequence = Some(page.sequence().wrapping_add(1));

        if self.in_packet && !page.is_continued() {
            self.queue_hole(DemuxError::UnterminatedPacket(page.sequence()));
        }

        let mut skipping = page.is_continued() && !self.in_packet;
        let mut offset = 0;
        let mut last_completed = None;

        for &lacing in &page.lacing {
            let segment = &page.body[offset..offset + lacing as usize];
            offset += lacing as usize;

            if skipping {
                trace!("Skipping continuation segment of a lost packet");
                skipping = lacing == CONTINUE_LACING;
                continue;
            }

            self.partial.extend_from_slice(segment);
            self.in_packet = true;

            if lacing < CONTINUE_LACING {
                self.ready.push_back(Pending::Packet {
                    data: std::mem::take(&mut self.partial),
                    granule_position: None,
                    eos: false,
                });
                self.in_packet = false;
                last_completed = Some(self.ready.len() - 1);
            }
        }

        if let Some(index) = last_completed {
            if let Some(Pending::Packet {
                granule_position,
                eos,
                ..
            }) = self.ready.get_mut(index)
            {
                *granule_position = Some(page.granule_position());
                *eos = page.is_eos();
            }
        }

        if page.is_eos() {
            self.eos_seen = true;
        }

        self.pages_accepted += 1;
        Accept::Accepted
    }

    /// Returns the next complete packet of the open stream.
    pub fn next_packet(&mut self) -> Pull<Packet> {
        let Some(pending) = self.ready.pop_front() else {
            return Pull::NeedMoreData;
        };

        let packetno = self.next_packetno;
        self.next_packetno += 1;

        match pending {
            Pending::Hole(err) => Pull::Corrupt(err.into()),
            Pending::Packet {
                data,
                granule_position,
                eos,
            } => {
                self.packets_out += 1;
                Pull::Found(Packet {
                    data,
                    packetno,
                    granule_position,
                    bos: packetno == 0,
                    eos,
                })
            }
        }
    }

    fn queue_hole(&mut self, err: DemuxError) {
        debug!("Queued hole: {err}");
        self.partial.clear();
        self.in_packet = false;
        self.holes += 1;
        self.ready.push_back(Pending::Hole(err));
    }

    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    pub fn pages_accepted(&self) -> u64 {
        self.pages_accepted
    }

    pub fn pages_ignored(&self) -> u64 {
        self.pages_ignored
    }

    pub fn packets_out(&self) -> u64 {
        self.packets_out
    }

    pub fn holes(&self) -> u64 {
        self.holes
    }

    /// An accepted page carried the end-of-stream flag.
    pub fn eos_seen(&self) -> bool {
        self.eos_seen
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{PageSpec, page};
    use crate::utils::errors::Hole;

    fn drain(demux: &mut StreamDemuxer) -> Vec<Result<Packet, Hole>> {
        let mut out = Vec::new();
        loop {
            match demux.next_packet() {
                Pull::Found(packet) => out.push(Ok(packet)),
                Pull::Corrupt(hole) => out.push(Err(hole)),
                Pull::NeedMoreData => return out,
            }
        }
    }

    #[test]
    fn packets_within_one_page() {
        let mut demux = StreamDemuxer::default();
        let page = page(&PageSpec::new(9, 0).bos().packet(b"a").packet(b"bb").granule(42));

        assert_eq!(demux.accept_page(&page), Accept::Accepted);
        let packets = drain(&mut demux);

        assert_eq!(packets.len(), 2);
        let first = packets[0].as_ref().unwrap();
        let second = packets[1].as_ref().unwrap();
        assert_eq!(first.data, b"a");
        assert!(first.bos);
        assert_eq!(first.granule_position, None);
        assert_eq!(second.data, b"bb");
        assert_eq!(second.packetno, 1);
        assert_eq!(second.granule_position, Some(42));
    }

    #[test]
    fn packet_spanning_pages() {
        let long = vec![7u8; 600];
        let mut demux = StreamDemuxer::default();

        let first = page(&PageSpec::new(1, 0).raw(&long[..510], &[255, 255]).granule(-1));
        let second = page(&PageSpec::new(1, 1).continued().raw(&long[510..], &[90]).eos());

        demux.accept_page(&first);
        assert!(matches!(demux.next_packet(), Pull::NeedMoreData));

        demux.accept_page(&second);
        match demux.next_packet() {
            Pull::Found(packet) => {
                assert_eq!(packet.data, long);
                assert!(packet.eos);
            }
            other => panic!("expected a packet, got {other:?}"),
        }
    }

    #[test]
    fn foreign_serial_is_ignored() {
        let mut demux = StreamDemuxer::default();
        demux.accept_page(&page(&PageSpec::new(1, 0).packet(b"mine")));

        let foreign = page(&PageSpec::new(2, 0).packet(b"theirs"));
        assert_eq!(demux.accept_page(&foreign), Accept::Ignored);
        assert_eq!(demux.pages_ignored(), 1);

        let packets = drain(&mut demux);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].as_ref().unwrap().data, b"mine");
    }

    #[test]
    fn sequence_gap_reports_hole_and_drops_partial() {
        let mut demux = StreamDemuxer::default();
        demux.accept_page(&page(&PageSpec::new(1, 0).packet(b"x")));
        demux.accept_page(&page(&PageSpec::new(1, 1).raw(&[1u8; 255], &[255])));
        // page 2 lost
        demux.accept_page(&page(
            &PageSpec::new(1, 3).continued().raw(&[2u8; 10], &[10]).packet(b"y"),
        ));

        let out = drain(&mut demux);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap().data, b"x");
        assert_eq!(
            out[1].as_ref().unwrap_err(),
            &Hole::Demux(DemuxError::SequenceGap {
                expected: 2,
                found: 3
            })
        );
        let y = out[2].as_ref().unwrap();
        assert_eq!(y.data, b"y");
        assert_eq!(y.packetno, 2);
        assert_eq!(demux.holes(), 1);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut demux = StreamDemuxer::default();
        let mut bad = page(&PageSpec::new(1, 0).packet(b"z"));
        bad.header.version = 1;

        assert_eq!(demux.accept_page(&bad), Accept::Rejected);
        assert!(matches!(
            demux.next_packet(),
            Pull::Corrupt(Hole::Demux(DemuxError::UnsupportedVersion(1)))
        ));
    }

    #[test]
    fn rejected_page_keeps_sequence() {
        let mut demux = StreamDemuxer::default();
        demux.accept_page(&page(&PageSpec::new(1, 0).packet(b"a")));
        let mut bad = page(&PageSpec::new(1, 1).packet(b"b"));
        bad.header.version = 1;
        assert_eq!(demux.accept_page(&bad), Accept::Rejected);
        demux.accept_page(&page(&PageSpec::new(1, 2).packet(b"c")));

        let out = drain(&mut demux);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap().data, b"a");
        assert_eq!(
            out[1].as_ref().unwrap_err(),
            &Hole::Demux(DemuxError::UnsupportedVersion(1))
        );
        assert_eq!(out[2].as_ref().unwrap().data, b"c");
        assert_eq!(demux.holes(), 1);
    }
}
