use std::io::{Read, Seek};

use byteorder::{ReadBytesExt, LE};
use tracing::trace;

use crate::error::Error;
use crate::Result;

const NAME_HAS_NUMBER: u16 = 1 << 15;

/// An interned name reference as it appears on the wire: a 15-bit table
/// index with the high bit flagging an attached number part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawName {
    pub index: u16,
    pub number: i32,
}

/// Primitive reads shared by every layer of the archive format.
///
/// Implemented for anything `Read + Seek`; the property and archive readers
/// are generic over this trait so nested blobs can re-enter the decoder with
/// a plain in-memory cursor.
pub(crate) trait ArchiveRead: Read + Seek {
    /// Current absolute position, for error reporting.
    fn offset(&mut self) -> u64 {
        self.stream_position().unwrap_or_default()
    }

    /// Length-prefixed string; a positive length includes the trailing NUL.
    fn read_fstring(&mut self) -> Result<String> {
        let offset = self.offset();
        let length = self.read_i32::<LE>()?;
        if length < 0 {
            return Err(Error::NegativeStringLength { length, offset });
        }
        if length == 0 {
            return Ok(String::new());
        }
        let mut bytes = vec![0; length as usize];
        self.read_exact(&mut bytes)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn read_raw_name(&mut self) -> Result<RawName> {
        let index = self.read_u16::<LE>()?;
        if index & NAME_HAS_NUMBER != 0 {
            Ok(RawName {
                index: index & !NAME_HAS_NUMBER,
                number: self.read_i32::<LE>()?,
            })
        } else {
            Ok(RawName { index, number: 0 })
        }
    }

    /// `count` reserved bytes, ignored. The tagged-property encoding leaves
    /// single pad bytes (historically enum-value slots) before most scalar
    /// payloads; this is the one place they are consumed.
    fn reserved(&mut self, count: usize) -> Result<()> {
        let mut bytes = [0u8; 8];
        debug_assert!(count <= bytes.len());
        let buf = &mut bytes[..count];
        self.read_exact(buf)?;
        if buf.iter().any(|&b| b != 0) {
            trace!(bytes = ?buf, "reserved bytes are nonzero");
        }
        Ok(())
    }
}

impl<R: Read + Seek> ArchiveRead for R {}
