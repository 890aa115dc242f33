//! Raw deflate streaming codec backed by `flate2`.
//!
//! Encoder and decoder contexts run without a zlib header and sync-flush
//! after every block, so each block ends on a byte boundary and the peer can
//! decompress it as soon as it arrives.

use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::{DecodeError, EncodeError, StreamCodec, StreamDecoder, StreamEncoder};

/// Compression level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const CODEC_NAME: &str = "deflate";
const SCRATCH_SIZE: usize = 16 * 1024;

/// Raw deflate codec.
#[derive(Clone, Copy, Debug)]
pub struct DeflateCodec {
    level: Compression,
}

impl DeflateCodec {
    /// Create a codec compressing at `level`, clamped to `0..=9`.
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self { Self::new(DEFAULT_COMPRESSION_LEVEL) }
}

impl StreamCodec for DeflateCodec {
    fn name(&self) -> &'static str { CODEC_NAME }

    fn new_encoder(&self) -> Box<dyn StreamEncoder> {
        Box::new(DeflateEncoder {
            inner: Compress::new(self.level, false),
            scratch: vec![0; SCRATCH_SIZE].into_boxed_slice(),
        })
    }

    fn new_decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(DeflateDecoder {
            inner: Decompress::new(false),
            scratch: vec![0; SCRATCH_SIZE].into_boxed_slice(),
        })
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "deltas are bounded by the slice lengths passed to flate2"
)]
fn delta(after: u64, before: u64) -> usize { (after - before) as usize }

struct DeflateEncoder {
    inner: Compress,
    scratch: Box<[u8]>,
}

impl StreamEncoder for DeflateEncoder {
    fn encode(&mut self, input: &[u8], dst: &mut BytesMut) -> Result<(), EncodeError> {
        let mut consumed = 0;
        loop {
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            self.inner
                .compress(&input[consumed..], &mut self.scratch, FlushCompress::Sync)
                .map_err(|e| EncodeError::Compress {
                    codec: CODEC_NAME,
                    reason: e.to_string(),
                })?;
            let read = delta(self.inner.total_in(), before_in);
            let produced = delta(self.inner.total_out(), before_out);
            consumed += read;
            dst.extend_from_slice(&self.scratch[..produced]);

            // A flush is complete once all input is taken and output stopped
            // filling the scratch space.
            if consumed == input.len() && produced < self.scratch.len() {
                return Ok(());
            }
            if read == 0 && produced == 0 {
                return Err(EncodeError::Compress {
                    codec: CODEC_NAME,
                    reason: "compressor made no progress".to_owned(),
                });
            }
        }
    }
}

struct DeflateDecoder {
    inner: Decompress,
    scratch: Box<[u8]>,
}

impl StreamDecoder for DeflateDecoder {
    fn decode(&mut self, input: &[u8], dst: &mut BytesMut) -> Result<(), DecodeError> {
        let mut consumed = 0;
        loop {
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .decompress(&input[consumed..], &mut self.scratch, FlushDecompress::Sync)
                .map_err(|e| DecodeError::Decompress {
                    codec: CODEC_NAME,
                    reason: e.to_string(),
                })?;
            let read = delta(self.inner.total_in(), before_in);
            let produced = delta(self.inner.total_out(), before_out);
            consumed += read;
            dst.extend_from_slice(&self.scratch[..produced]);

            if status == Status::StreamEnd {
                if consumed < input.len() {
                    return Err(DecodeError::Decompress {
                        codec: CODEC_NAME,
                        reason: "data after end of stream".to_owned(),
                    });
                }
                return Ok(());
            }
            if consumed == input.len() && produced < self.scratch.len() {
                return Ok(());
            }
            if read == 0 && produced == 0 {
                return Err(DecodeError::Decompress {
                    codec: CODEC_NAME,
                    reason: "decompressor made no progress".to_owned(),
                });
            }
        }
    }
}
