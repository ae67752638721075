//! Skeleton binary format version.

/// Major version of the skeleton binary format. Files with a different major are rejected.
pub const FORMAT_MAJOR: u32 = 1;

/// Minor version written by current exporters. Older minors of the same major load fine.
pub const FORMAT_MINOR: u32 = 2;

/// Magic bytes at the start of every skeleton binary.
pub const FORMAT_MAGIC: [u8; 4] = *b"SKL2";
