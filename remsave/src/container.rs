//! The outer save container: a CRC-tagged fixed header followed by a
//! sequence of self-describing zlib chunks.

use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, LE};
use tracing::{instrument, warn};

use crate::error::Error;
use crate::Result;

const PACKAGE_FILE_TAG: u32 = 0x9E2A_83C1;

/// Per-chunk cap on the compressed payload.
const MAX_COMPRESSED_SIZE: u64 = 20 * 1024 * 1024;
/// Per-chunk cap on the inflated output.
const MAX_DECOMPRESSED_SIZE: u64 = 40 * 1024 * 1024;

/// Decompress the chunked container into one contiguous buffer.
///
/// The 12 header bytes (`crc`, `bytes_written`, `save_game_file_version`)
/// are retained at the start of the output because the archive's name and
/// object table offsets are absolute and assume they are present.
#[instrument(skip_all)]
pub(crate) fn decompress(r: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let crc = r.read_u32::<LE>()?;
    let bytes_written = r.read_u32::<LE>()?;
    let version = r.read_u32::<LE>()?;
    if version <= 8 {
        return Err(Error::UnsupportedVersion { version });
    }

    let input = *r.get_ref();
    let mut out = Vec::with_capacity(input.len());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&bytes_written.to_le_bytes());
    out.extend_from_slice(&version.to_le_bytes());

    let mut chunk_index = 0usize;
    while r.position() < input.len() as u64 {
        let compressed_size = match read_chunk_header(r, chunk_index) {
            Ok(size) => size,
            Err(Error::UnexpectedEof) => return Err(Error::TruncatedChunk { chunk_index }),
            Err(e) => return Err(e),
        };
        if compressed_size > MAX_COMPRESSED_SIZE {
            return Err(Error::ChunkTooLarge { chunk_index });
        }

        let start = r.position() as usize;
        let end = start + compressed_size as usize;
        if end > input.len() {
            return Err(Error::TruncatedChunk { chunk_index });
        }
        let compressed = &input[start..end];
        r.set_position(end as u64);

        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(compressed)
            .take(MAX_DECOMPRESSED_SIZE + 1)
            .read_to_end(&mut inflated)
            .map_err(|source| Error::InflateFailed {
                chunk_index,
                source,
            })?;
        if inflated.len() as u64 > MAX_DECOMPRESSED_SIZE {
            return Err(Error::ChunkTooLarge { chunk_index });
        }

        out.extend_from_slice(&inflated);
        chunk_index += 1;
    }

    Ok(out)
}

/// Consume one chunk header and return the compressed payload size.
///
/// Besides the package file tag and compressor id, the header repeats the
/// loading chunk size and inflated size several times; the echoes are
/// consumed but not required to match.
fn read_chunk_header(r: &mut Cursor<&[u8]>, chunk_index: usize) -> Result<u64> {
    let tag = r.read_u64::<LE>()?;
    if tag as u32 != PACKAGE_FILE_TAG {
        warn!(
            chunk_index,
            tag = format_args!("{tag:#018x}"),
            "chunk tag does not match the package file tag, continuing"
        );
    }
    r.read_u64::<LE>()?; // loading compression chunk size
    r.read_u8()?; // compressor id
    let compressed_size = r.read_u64::<LE>()?;
    r.read_u64::<LE>()?; // chunk size echo
    r.read_u64::<LE>()?; // inflated size echo
    r.read_u64::<LE>()?; // chunk size echo
    Ok(compressed_size)
}
