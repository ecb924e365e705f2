//! Channels as sequences.
//!
//! Encoding a [`Chan`] drains the items buffered at that moment into an
//! array. Decoding sends every decoded element into the channel once the
//! whole array has been read.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};

use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, EncodeError};
use crate::reflect::{Codec, Reflect, SeqTarget};
use crate::types::{Describe, Shape, TypeRef};

/// A channel endpoint pair the codec can fill and drain.
pub struct Chan<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    // Elements decoded but not yet sent.
    pending: Vec<T>,
}

impl<T> Chan<T> {
    pub fn unbounded() -> Self {
        let (tx, rx) = channel::unbounded();
        Chan::from_parts(tx, rx)
    }

    pub fn bounded(cap: usize) -> Self {
        let (tx, rx) = channel::bounded(cap);
        Chan::from_parts(tx, rx)
    }

    pub fn from_parts(tx: Sender<T>, rx: Receiver<T>) -> Self {
        Chan {
            tx,
            rx,
            pending: Vec::new(),
        }
    }

    pub fn sender(&self) -> &Sender<T> {
        &self.tx
    }

    pub fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn drain(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.rx.len());
        loop {
            match self.rx.try_recv() {
                Ok(v) => out.push(v),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}

impl<T> Default for Chan<T> {
    fn default() -> Self {
        Chan::unbounded()
    }
}

impl<T: Codec + Default> Describe for Chan<T> {
    fn shape() -> Shape {
        Shape::Chan(TypeRef::of::<T>())
    }
}

impl<T: Codec + Default> Reflect for Chan<T> {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        let items = self.drain();
        e.encode_seq(items.len(), items.iter().map(|x| x as &dyn Reflect))
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.decode_seq(self)
    }

    fn is_empty_value(&self) -> bool {
        self.rx.is_empty()
    }

    fn reset_zero(&mut self) {
        self.drain();
    }

    crate::reflect_any!();
}

impl<T: Codec + Default> SeqTarget for Chan<T> {
    fn begin(&mut self, reserve: usize) {
        self.pending.clear();
        self.pending.reserve(reserve);
    }

    fn decode_elem(&mut self, _index: usize, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let mut v = T::default();
        d.decode_value(&mut v)?;
        self.pending.push(v);
        Ok(())
    }

    fn finish(&mut self, _count: usize) -> Result<(), DecodeError> {
        for v in self.pending.drain(..) {
            // The receiver is held here too, so a blocking send could never
            // complete on a full channel.
            self.tx.try_send(v).map_err(|e| match e {
                TrySendError::Full(_) => DecodeError::Other("channel is full".into()),
                TrySendError::Disconnected(_) => DecodeError::Other("channel is closed".into()),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_slice, to_vec};
    use crate::format::binc::BincHandle;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chan_roundtrip() {
        let h = BincHandle::default();
        let ch: Chan<u32> = Chan::unbounded();
        for i in 1..=3 {
            ch.sender().send(i).unwrap();
        }
        let b = to_vec(&ch, &h).unwrap();
        assert!(ch.is_empty());

        let back: Chan<u32> = from_slice(&b, &h).unwrap();
        let got: Vec<u32> = back.receiver().try_iter().collect();
        assert_eq!(got, vec![1, 2, 3]);
    }
}
