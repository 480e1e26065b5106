//! src/decryptor/stream.rs
//! Lazy AES-256-CBC decryption with an all-zero IV.
//!
//! There is no padding check and no authentication: a wrong key yields
//! well-formed garbage, never an error. The only failure the cipher itself can
//! report is a ciphertext that does not end on a block boundary.

use crate::aliases::{Aes256Key32, Block16, PlaintextBuffer};
use crate::consts::{AES_BLOCK_SIZE, STREAM_CHUNK_SIZE};
use crate::error::BackupError;
use crate::utils::{read_full, xor_blocks};
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes256Dec, Block as AesBlock};
use std::io::{self, Read, Write};

/// `Read` adapter that decrypts `inner` as it is consumed.
///
/// Ciphertext is pulled in chunks of [`STREAM_CHUNK_SIZE`]; decrypted bytes
/// sit in a zeroize-on-drop buffer until handed out. To decrypt again, build
/// a new reader over a fresh ciphertext stream.
pub struct CbcDecryptReader<R> {
    inner: R,
    cipher: Aes256Dec,
    /// Previous ciphertext block; starts as the zero IV.
    chain: Block16,
    buffer: PlaintextBuffer,
    pos: usize,
    eof: bool,
}

impl<R: Read> CbcDecryptReader<R> {
    pub fn new(inner: R, key: &Aes256Key32) -> Self {
        Self {
            inner,
            cipher: Aes256Dec::new(key.expose_secret().into()),
            chain: Block16::new([0u8; AES_BLOCK_SIZE]),
            buffer: PlaintextBuffer::new(Vec::with_capacity(STREAM_CHUNK_SIZE)),
            pos: 0,
            eof: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let buf = self.buffer.expose_secret_mut();
        buf.resize(STREAM_CHUNK_SIZE, 0);
        self.pos = 0;

        let filled = match read_full(&mut self.inner, buf) {
            Ok(n) => n,
            Err(e) => {
                buf.clear();
                self.eof = true;
                return Err(e);
            }
        };
        // read_full only stops short at EOF.
        if filled < STREAM_CHUNK_SIZE {
            self.eof = true;
        }
        if filled % AES_BLOCK_SIZE != 0 {
            buf.clear();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "ciphertext is not a multiple of {AES_BLOCK_SIZE} bytes ({} trailing)",
                    filled % AES_BLOCK_SIZE
                ),
            ));
        }
        buf.truncate(filled);

        for block in buf.chunks_exact_mut(AES_BLOCK_SIZE) {
            let mut ciphertext = [0u8; AES_BLOCK_SIZE];
            ciphertext.copy_from_slice(block);

            let mut aes_block = AesBlock::from(ciphertext);
            self.cipher.decrypt_block(&mut aes_block);
            xor_blocks(aes_block.as_slice(), self.chain.expose_secret(), block);

            *self.chain.expose_secret_mut() = ciphertext;
        }
        Ok(())
    }
}

impl<R: Read> Read for CbcDecryptReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.buffer.expose_secret().len() {
            if self.eof {
                return Ok(0);
            }
            self.refill()?;
        }

        let available = &self.buffer.expose_secret()[self.pos..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Decrypt a whole ciphertext stream into `output_writer`.
///
/// Returns the number of plaintext bytes written (equal to the ciphertext length).
#[inline(always)]
pub fn decrypt_ciphertext_stream<R, W>(
    input_reader: R,
    mut output_writer: W,
    key: &Aes256Key32,
) -> Result<u64, BackupError>
where
    R: Read,
    W: Write,
{
    let mut reader = CbcDecryptReader::new(input_reader, key);
    let written = io::copy(&mut reader, &mut output_writer)?;
    output_writer.flush()?;
    Ok(written)
}
