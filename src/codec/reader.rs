//! Byte sources for the decoder: a borrowed slice or any `io::Read`.

use std::io::{self, BufReader, Read};

use crate::error::DecodeError;

/// Largest single allocation made for a length-prefixed read from a stream.
const READ_CHUNK: usize = 64 * 1024;

/// Byte source with one byte of lookahead and optional capture.
pub trait DecReader {
    fn read_byte(&mut self) -> Result<u8, DecodeError>;

    /// Next byte without consuming it; `None` at end of input.
    fn peek_byte(&mut self) -> Result<Option<u8>, DecodeError>;

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError>;

    /// Read `n` bytes. Never reserves more than the input can back.
    fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, DecodeError>;

    /// Bytes consumed so far.
    fn num_read(&self) -> usize;

    /// Start recording consumed bytes.
    fn start_capture(&mut self);

    /// Stop recording and return what was consumed since `start_capture`.
    fn end_capture(&mut self) -> Vec<u8>;
}

/// Reader over an in-memory slice.
pub struct BytesReader<'a> {
    data: &'a [u8],
    pos: usize,
    capture: Option<usize>,
}

impl<'a> BytesReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BytesReader {
            data,
            pos: 0,
            capture: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof { offset: self.pos }
    }
}

impl DecReader for BytesReader<'_> {
    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        Ok(self.data.get(self.pos).copied())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        if buf.len() > self.remaining() {
            return Err(self.eof());
        }
        buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }

    fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, DecodeError> {
        if n > self.remaining() {
            return Err(self.eof());
        }
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    fn num_read(&self) -> usize {
        self.pos
    }

    fn start_capture(&mut self) {
        self.capture = Some(self.pos);
    }

    fn end_capture(&mut self) -> Vec<u8> {
        match self.capture.take() {
            Some(start) => self.data[start..self.pos].to_vec(),
            None => Vec::new(),
        }
    }
}

/// Reader over any `io::Read`, buffered.
pub struct IoReader<R: Read> {
    inner: BufReader<R>,
    peeked: Option<u8>,
    count: usize,
    capture: Option<Vec<u8>>,
}

impl<R: Read> IoReader<R> {
    pub fn new(inner: R) -> Self {
        IoReader {
            inner: BufReader::new(inner),
            peeked: None,
            count: 0,
            capture: None,
        }
    }

    fn fill_one(&mut self) -> Result<Option<u8>, DecodeError> {
        let mut b = [0u8; 1];
        loop {
            match self.inner.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
    }

    fn consumed(&mut self, bytes: &[u8]) {
        self.count += bytes.len();
        if let Some(cap) = self.capture.as_mut() {
            cap.extend_from_slice(bytes);
        }
    }
}

impl<R: Read> DecReader for IoReader<R> {
    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let b = match self.peeked.take() {
            Some(b) => b,
            None => self.fill_one()?.ok_or(DecodeError::UnexpectedEof {
                offset: self.count,
            })?,
        };
        self.consumed(&[b]);
        Ok(b)
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.peeked.is_none() {
            self.peeked = self.fill_one()?;
        }
        Ok(self.peeked)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut start = 0;
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            start = 1;
        }
        self.inner.read_exact(&mut buf[start..]).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                DecodeError::UnexpectedEof { offset: self.count }
            } else {
                DecodeError::Io(e)
            }
        })?;
        self.consumed(buf);
        Ok(())
    }

    fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::with_capacity(n.min(READ_CHUNK));
        while out.len() < n {
            let start = out.len();
            let take = (n - start).min(READ_CHUNK);
            out.resize(start + take, 0);
            self.read_exact(&mut out[start..])?;
        }
        Ok(out)
    }

    fn num_read(&self) -> usize {
        self.count
    }

    fn start_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    fn end_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }
}
