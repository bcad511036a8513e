use std::fmt;

use binrw::binread;

// note: a .dat record is SIZE (u32), 2 unused bytes, LIVE (u32), then SIZE u32 counters.
// Everything is little endian, the file usually ends with 8 more bytes nobody reads.

/// composes a little endian u32 byte by byte, the result does not depend on the host byte order
pub const fn le_u32(bytes: [u8; 4]) -> u32 {
    (bytes[0] as u32)
        | ((bytes[1] as u32) << 8)
        | ((bytes[2] as u32) << 16)
        | ((bytes[3] as u32) << 24)
}

/// a 4 byte little endian word
///
/// The raw bytes are read and composed with [`le_u32`], so the endian passed
/// to binrw has no effect.
#[binread]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LeWord(#[br(map = |bytes: [u8; 4]| le_u32(bytes))] pub u32);

impl LeWord {
    pub fn byte_len() -> u32 {
        4
    }
}

#[binread]
#[derive(Debug, Default, Clone, Copy)]
pub struct Gap(pub [u8; 2]);

impl Gap {
    pub fn byte_len() -> u32 {
        2
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DatHeader {
    /// number of channels, also the number of counters following the header
    pub channel_count: u32,
    // only the upper 2 bytes are used by the instrument, reported unmasked
    pub live_time: u32,
}

impl DatHeader {
    pub fn byte_len() -> u32 {
        LeWord::byte_len() + Gap::byte_len() + LeWord::byte_len()
    }

    /// bytes consumed by a full conversion, the trailer is not included
    pub fn record_len(&self) -> u64 {
        Self::byte_len() as u64 + self.channel_count as u64 * LeWord::byte_len() as u64
    }
}

/// the field a read was attempting when it came up short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatField {
    ChannelCount,
    Gap,
    LiveTime,
    Counter,
}

impl fmt::Display for DatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChannelCount => "size",
            Self::Gap => "gap bytes",
            Self::LiveTime => "live time",
            Self::Counter => "counter value",
        })
    }
}
