//! Notification records and data blocks.
//!
//! The kernel-side notification channels produce fixed-size read records;
//! [`ReadInfo`] mirrors that layout. [`DataBlock`] is the unit a data loader
//! hands back to the filesystem when writing fetched data.

use std::os::fd::BorrowedFd;

/// Identity of a file inside the incremental filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId([u8; 16]);

impl FileId {
    /// Wrap a raw 16-byte file identity.
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One read notification from a kernel channel.
///
/// Both channel kinds deliver the same record shape: pending-read records
/// carry a meaningful serial number, page-read records a meaningful
/// timestamp. Records inside one drained batch preserve kernel delivery
/// order; nothing is guaranteed across batches or channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadInfo {
    /// File the read targets
    pub file_id: FileId,
    /// Microsecond timestamp assigned by the kernel
    pub timestamp_us: u64,
    /// Index of the block being read
    pub block_index: u32,
    /// Kernel serial number of the notification
    pub serial_no: u32,
}

impl ReadInfo {
    /// Size in bytes of one record on the kernel channel.
    pub const WIRE_SIZE: usize = 32;

    /// Decode one record from its kernel wire layout (host endianness).
    pub fn from_wire(raw: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut file_id = [0u8; 16];
        file_id.copy_from_slice(&raw[..16]);
        Self {
            file_id: FileId::new(file_id),
            timestamp_us: u64::from_ne_bytes(raw[16..24].try_into().expect("8-byte slice")),
            block_index: u32::from_ne_bytes(raw[24..28].try_into().expect("4-byte slice")),
            serial_no: u32::from_ne_bytes(raw[28..32].try_into().expect("4-byte slice")),
        }
    }

    /// Encode this record into its kernel wire layout.
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut raw = [0u8; Self::WIRE_SIZE];
        raw[..16].copy_from_slice(self.file_id.as_bytes());
        raw[16..24].copy_from_slice(&self.timestamp_us.to_ne_bytes());
        raw[24..28].copy_from_slice(&self.block_index.to_ne_bytes());
        raw[28..32].copy_from_slice(&self.serial_no.to_ne_bytes());
        raw
    }
}

/// Payload kind of a written block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// File data
    Data,
    /// Hash-tree data backing verification
    Hash,
}

/// Compression applied to a block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Raw payload
    None,
    /// LZ4-compressed payload
    Lz4,
    /// Zstd-compressed payload
    Zstd,
}

/// One block of fetched data, written back through the connector.
#[derive(Debug, Clone, Copy)]
pub struct DataBlock<'a> {
    /// Write descriptor of the target file, as returned by
    /// [`FilesystemConnector::open_for_write`](crate::FilesystemConnector::open_for_write)
    pub file: BorrowedFd<'a>,
    /// Index of the block inside the file
    pub block_index: u32,
    /// Payload kind
    pub kind: BlockKind,
    /// Payload compression
    pub compression: Compression,
    /// Block payload
    pub data: &'a [u8],
}
