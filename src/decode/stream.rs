//! In-memory pull source for the JPEG2000 engine.

use std::io;

/// A byte buffer with a cursor, exposing the read/skip/seek contract the
/// decoder pulls from.
///
/// One instance per decode; not shared between threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteStream {
    data: Vec<u8>,
    pos: usize,
}

impl ByteStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Copy up to `dst.len()` bytes from the cursor into `dst`.
    ///
    /// Returns how many bytes were copied; 0 means the buffer is exhausted.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let count = (self.data.len() - self.pos).min(dst.len());
        dst[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
        self.pos += count;
        count
    }

    /// Move the cursor by `delta`, clamping at both ends.
    ///
    /// Returns the new absolute position.
    pub fn skip(&mut self, delta: i64) -> u64 {
        let distance = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
        if delta >= 0 {
            self.pos += distance.min(self.data.len() - self.pos);
        } else {
            self.pos -= distance.min(self.pos);
        }
        self.pos as u64
    }

    /// Jump to `target` if it lies within `0..=len`.
    ///
    /// Out-of-range targets return `false` and leave the cursor alone.
    pub fn seek(&mut self, target: i64) -> bool {
        match usize::try_from(target) {
            Ok(target) if target <= self.data.len() => {
                self.pos = target;
                true
            }
            _ => false,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl io::Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(ByteStream::read(self, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_advances_and_stops_at_end() {
        let mut stream = ByteStream::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(stream.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(stream.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(stream.read(&mut buf), 0);
        assert_eq!(stream.position(), 5);
    }

    #[test]
    fn test_skip_forward_clamps_at_len() {
        let mut stream = ByteStream::new(vec![0; 10]);
        assert_eq!(stream.skip(4), 4);
        assert_eq!(stream.skip(100), 10);
    }

    #[test]
    fn test_skip_backward_past_start_clamps_to_zero() {
        let mut stream = ByteStream::new(vec![0; 10]);
        stream.skip(3);
        assert_eq!(stream.skip(-7), 0);
        assert_eq!(stream.skip(i64::MIN), 0);
    }

    #[test]
    fn test_seek_accepts_end_and_rejects_out_of_range() {
        let mut stream = ByteStream::new(vec![0; 10]);
        assert!(stream.seek(10));
        assert_eq!(stream.position(), 10);
        assert!(stream.seek(2));
        assert!(!stream.seek(11));
        assert!(!stream.seek(-1));
        assert_eq!(stream.position(), 2);
    }

    #[test]
    fn test_io_read_reaches_eof() {
        use std::io::Read;

        let mut stream = ByteStream::new(b"j2k".to_vec());
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"j2k");
    }
}
