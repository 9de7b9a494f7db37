//! Wire encoding for notification bodies.
//!
//! A body travels through the queue as gzip-compressed bytes rendered in
//! the RFC 1924 base85 alphabet. The encoding has no padding: input is
//! zero-padded to a multiple of four bytes, then the surplus characters are
//! dropped from the last chunk. Decoding pads with the highest digit and
//! drops the surplus bytes.

use std::io::{Read, Write};

use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};

use crate::error::{NotifyError, Result};

const ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

/// Compresses and base85-encodes a body for the queue.
pub fn bin2wire(body: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).map_err(|e| NotifyError::codec(format!("gzip: {e}")))?;
    let compressed = encoder.finish().map_err(|e| NotifyError::codec(format!("gzip: {e}")))?;
    Ok(b85encode(&compressed))
}

/// Inverse of [`bin2wire`].
pub fn wire2bin(wire: &str) -> Result<Vec<u8>> {
    let compressed = b85decode(wire)?;
    let mut body = Vec::new();
    MultiGzDecoder::new(compressed.as_slice())
        .read_to_end(&mut body)
        .map_err(|e| NotifyError::codec(format!("gunzip: {e}")))?;
    Ok(body)
}

/// Encodes bytes with the RFC 1924 alphabet.
pub fn b85encode(data: &[u8]) -> String {
    let padding = (4 - data.len() % 4) % 4;
    let mut out = Vec::with_capacity((data.len() + padding) / 4 * 5);

    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut acc = u32::from_be_bytes(word);

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = ALPHABET[(acc % 85) as usize];
            acc /= 85;
        }
        out.extend_from_slice(&digits);
    }

    out.truncate(out.len() - padding);
    // Every byte comes from ALPHABET, which is ASCII.
    out.into_iter().map(char::from).collect()
}

/// Decodes RFC 1924 base85 text.
pub fn b85decode(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let padding = (5 - bytes.len() % 5) % 5;
    let mut out = Vec::with_capacity((bytes.len() + padding) / 5 * 4);

    for (index, chunk) in bytes.chunks(5).enumerate() {
        let mut acc: u64 = 0;
        for position in 0..5 {
            let value = match chunk.get(position) {
                Some(&c) => digit_value(c).ok_or_else(|| {
                    NotifyError::codec(format!(
                        "bad base85 character at position {}",
                        index * 5 + position
                    ))
                })?,
                None => 84,
            };
            acc = acc * 85 + u64::from(value);
        }
        let word = u32::try_from(acc).map_err(|_| {
            NotifyError::codec(format!("base85 overflow in hunk starting at byte {}", index * 5))
        })?;
        out.extend_from_slice(&word.to_be_bytes());
    }

    out.truncate(out.len() - padding);
    Ok(out)
}

fn digit_value(c: u8) -> Option<u8> {
    ALPHABET.iter().position(|&a| a == c).and_then(|p| u8::try_from(p).ok())
}
