use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;

use super::{RangeTransport, TransportStats};

/// Range reads against any local `Read + Seek` source — typically a
/// `std::fs::File`, but any seekable in-memory buffer works too, which is
/// handy for tests.
pub struct FileRangeTransport<S> {
    source: S,
    stats: TransportStats,
}

impl<S: Read + Seek> FileRangeTransport<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            stats: TransportStats::default(),
        }
    }
}

impl<S: Read + Seek> RangeTransport for FileRangeTransport<S> {
    fn read_range(&mut self, begin: u64, length: usize) -> Result<Vec<u8>> {
        self.source.seek(SeekFrom::Start(begin))?;
        let mut buf = vec![0u8; length];
        let mut total_read = 0;
        loop {
            let n = self.source.read(&mut buf[total_read..])?;
            if n == 0 {
                break;
            }
            total_read += n;
            if total_read == length {
                break;
            }
        }
        buf.truncate(total_read);
        self.stats.record(length);
        Ok(buf)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
