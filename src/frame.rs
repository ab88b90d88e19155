//! Skippable-frame wrapping for published dictionaries.
//!
//! Layout: `5D 2A 4D 18` | payload length (u32 LE) | payload.
//! The payload is a zstd dictionary, optionally zstd-compressed.

use std::io::Read;

use crate::error::{Result, TrainerError};

pub const SKIPPABLE_FRAME_MAGIC: [u8; 4] = [0x5D, 0x2A, 0x4D, 0x18];
pub const ZSTD_FRAME_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
pub const DICTIONARY_MAGIC: [u8; 4] = [0x37, 0xA4, 0x30, 0xEC];
pub const FRAME_HEADER_LEN: usize = 8;

/// Upper bound on a decompressed embedded dictionary.
const MAX_DICTIONARY_SIZE: usize = 64 * 1024 * 1024;

pub fn write_skippable_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| TrainerError::format(format!("payload of {} bytes does not fit a skippable frame", payload.len())))?;
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&SKIPPABLE_FRAME_MAGIC);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Reads the frame header. `Ok(None)` means the bytes are not a skippable frame.
pub fn parse_frame_header(header: &[u8]) -> Result<Option<u32>> {
    if header.len() < 4 || header[..4] != SKIPPABLE_FRAME_MAGIC {
        return Ok(None);
    }
    if header.len() < FRAME_HEADER_LEN {
        return Err(TrainerError::format(format!(
            "skippable frame header truncated: {} of {} bytes",
            header.len(),
            FRAME_HEADER_LEN
        )));
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Ok(Some(len))
}

/// Turns a frame payload into raw dictionary bytes, decompressing it if needed.
pub fn decode_dictionary_payload(payload: &[u8]) -> Result<Vec<u8>> {
    let dictionary = if payload.starts_with(&ZSTD_FRAME_MAGIC) {
        let mut out = Vec::new();
        zstd::stream::read::Decoder::new(payload)
            .and_then(|d| d.take(MAX_DICTIONARY_SIZE as u64 + 1).read_to_end(&mut out))
            .map_err(|e| TrainerError::format(format!("embedded dictionary does not decompress: {}", e)))?;
        if out.len() > MAX_DICTIONARY_SIZE {
            return Err(TrainerError::format(format!("embedded dictionary exceeds {} bytes", MAX_DICTIONARY_SIZE)));
        }
        out
    } else {
        payload.to_vec()
    };
    if !dictionary.starts_with(&DICTIONARY_MAGIC) {
        return Err(TrainerError::format("not a dictionary"));
    }
    Ok(dictionary)
}

/// Extracts the dictionary from a complete in-memory framed blob.
pub fn read_framed_dictionary(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let len = match parse_frame_header(data)? {
        Some(len) => len as usize,
        None => return Ok(None),
    };
    let payload = data
        .get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)
        .ok_or_else(|| TrainerError::format(format!("skippable frame declares {} bytes, {} present", len, data.len() - FRAME_HEADER_LEN)))?;
    decode_dictionary_payload(payload).map(Some)
}
