/// A unit of compressed payload extracted from one or more pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,

    /// Position of the packet within its logical stream, starting at 0.
    pub packetno: u64,

    /// Granule position of the page this packet finished on, if it was the
    /// last packet completed there.
    pub granule_position: Option<i64>,

    /// First packet of the logical stream.
    pub bos: bool,

    /// Last packet of the logical stream.
    pub eos: bool,
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
