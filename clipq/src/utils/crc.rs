//! Page checksum.
//!
//! Ogg pages carry a CRC-32 over the whole page with the checksum field set
//! to zero. The variant is the direct (non-reflected) form with polynomial
//! `0x04C11DB7`, zero initial value and no final xor.

/// CRC algorithm specification with polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-32 algorithm for page checksums.
pub const CRC_PAGE_ALG: Algorithm<u32> = Algorithm {
    poly: 0x04c1_1db7,
    init: 0x0000_0000,
};

/// Byte offset of the checksum field inside a page header.
pub const CHECKSUM_OFFSET: usize = 22;

/// Computes the CRC-32 register for one table index.
#[inline(always)]
pub const fn crc32(poly: u32, value: u8) -> u32 {
    let mut crc = (value as u32) << 24;

    let mut i = 0;
    while i < 8 {
        crc = (crc << 1) ^ (((crc >> 31) & 1) * poly);
        i += 1;
    }

    crc
}

#[inline(always)]
const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32(poly, i as u8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    table: [u32; 256],
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc32_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u32) -> u32 {
        self.table[(index & 0xFF) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = (crc << 8) ^ self.table_entry((crc >> 24) ^ bytes[i] as u32);
            i += 1;
        }

        crc
    }

    /// Checksum of a complete page, treating the checksum field as zero.
    pub fn page_checksum(&self, header: &[u8], body: &[u8]) -> u32 {
        let crc = self.update(self.init, &header[..CHECKSUM_OFFSET]);
        let crc = self.update(crc, &[0u8; 4]);
        let crc = self.update(crc, &header[CHECKSUM_OFFSET + 4..]);
        self.update(crc, body)
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new(&CRC_PAGE_ALG)
    }
}

#[test]
fn check_value() {
    let crc = Crc32::default();
    assert_eq!(crc.update(crc.init, b"123456789"), 0x89A1_897F);
}

#[test]
fn checksum_field_is_ignored() {
    let crc = Crc32::default();
    let mut header = [0u8; 28];
    header[..4].copy_from_slice(b"OggS");
    let body = [1u8, 2, 3];

    let before = crc.page_checksum(&header, &body);
    header[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(crc.page_checksum(&header, &body), before);
}
