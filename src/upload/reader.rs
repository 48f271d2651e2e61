//! Slices an `AsyncRead` of unknown length into fixed-size parts

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

pub(crate) struct PartReader<R> {
    reader: R,
    part_size: usize,
    bytes_read: u64,
    eof: bool,
}

impl<R> PartReader<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(reader: R, part_size: usize) -> Self {
        Self {
            reader,
            part_size,
            bytes_read: 0,
            eof: false,
        }
    }

    /// Next part of exactly `part_size` bytes, shorter only at end of stream.
    /// `None` once the stream is exhausted.
    pub(crate) async fn next_part(&mut self) -> io::Result<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.part_size];
        let mut filled = 0;
        while filled < self.part_size {
            let read = self.reader.read(&mut buffer[filled..]).await?;
            if read == 0 {
                self.eof = true;
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(None);
        }

        buffer.truncate(filled);
        self.bytes_read += filled as u64;
        Ok(Some(Bytes::from(buffer)))
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}
