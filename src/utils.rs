//! Utility functions used across the library.

use std::io::{self, Read};

/// XORs two 16-byte blocks and writes the result to `output`.
///
/// Used by the CBC stream reader to undo chaining.
///
/// # Panics (by contract)
///
/// Panics if any slice is shorter than 16 bytes. Callers pass exact AES
/// blocks, so this never happens in practice.
#[inline(always)]
pub const fn xor_blocks(block_a: &[u8], block_b: &[u8], output: &mut [u8]) {
    let mut i = 0;
    while i < 16 {
        output[i] = block_a[i] ^ block_b[i];
        i += 1;
    }
}

/// Read until `buf` is full or the reader hits EOF.
///
/// Returns the number of bytes read. Unlike [`Read::read_exact`], a short
/// read at EOF is not an error.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// `true` for a non-empty, ASCII-hex string of at least two characters.
pub fn is_hex_id(id: &str) -> bool {
    id.len() >= 2 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
