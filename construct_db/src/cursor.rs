use std::ops::Bound;

use crate::{database::visible, Column};

/// Smallest key greater than every key starting with `prefix`, if there is
/// one.
fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// A bidirectional position within the keys of a column sharing a prefix.
///
/// The cursor reads at the sequence number it was created with and holds no
/// lock between steps. Created from a [`Snapshot`](crate::Snapshot) it sees
/// exactly that state; otherwise versions overwritten more than once since
/// its creation may disappear from under it.
pub struct Cursor {
    column: Column,
    prefix: Vec<u8>,
    end: Option<Vec<u8>>,
    seq: u64,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl Cursor {
    pub(crate) fn new(column: Column, prefix: Vec<u8>, seq: u64) -> Self {
        let end = successor(&prefix);
        let mut ret = Self {
            column,
            prefix,
            end,
            seq,
            current: None,
        };
        ret.seek_first();
        ret
    }

    fn upper(&self) -> Bound<&[u8]> {
        match &self.end {
            Some(end) => Bound::Excluded(end.as_slice()),
            None => Bound::Unbounded,
        }
    }

    fn forward(&self, lower: Bound<&[u8]>) -> Option<(Vec<u8>, Vec<u8>)> {
        if let (Some(end), Bound::Included(k) | Bound::Excluded(k)) = (&self.end, lower) {
            if k >= end.as_slice() {
                return None;
            }
        }

        let rows = self.column.data().rows.read();
        rows.range::<[u8], _>((lower, self.upper()))
            .find_map(|(k, v)| visible(v, self.seq).map(|val| (k.clone(), val.clone())))
    }

    fn backward(&self, upper: Bound<&[u8]>) -> Option<(Vec<u8>, Vec<u8>)> {
        if let Bound::Included(k) | Bound::Excluded(k) = upper {
            if k < self.prefix.as_slice() {
                return None;
            }
        }

        let rows = self.column.data().rows.read();
        rows.range::<[u8], _>((Bound::Included(self.prefix.as_slice()), upper))
            .rev()
            .find_map(|(k, v)| visible(v, self.seq).map(|val| (k.clone(), val.clone())))
    }

    fn clamp_lower<'a>(&'a self, key: &'a [u8]) -> &'a [u8] {
        if key < self.prefix.as_slice() {
            &self.prefix
        } else {
            key
        }
    }

    pub fn seek_first(&mut self) -> bool {
        self.current = self.forward(Bound::Included(self.prefix.as_slice()));
        self.valid()
    }

    pub fn seek_last(&mut self) -> bool {
        self.current = self.backward(self.upper());
        self.valid()
    }

    /// Position at the first key not less than `key`.
    pub fn seek(&mut self, key: &[u8]) -> bool {
        let lower = self.clamp_lower(key);
        self.current = self.forward(Bound::Included(lower));
        self.valid()
    }

    /// Position at the last key not greater than `key`.
    pub fn seek_rev(&mut self, key: &[u8]) -> bool {
        self.current = match &self.end {
            Some(end) if key >= end.as_slice() => self.backward(Bound::Excluded(end.as_slice())),
            _ => self.backward(Bound::Included(key)),
        };
        self.valid()
    }

    pub fn next(&mut self) -> bool {
        self.current = match self.current.take() {
            Some((key, _)) => self.forward(Bound::Excluded(key.as_slice())),
            None => None,
        };
        self.valid()
    }

    pub fn prev(&mut self) -> bool {
        self.current = match self.current.take() {
            Some((key, _)) => self.backward(Bound::Excluded(key.as_slice())),
            None => None,
        };
        self.valid()
    }

    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Visit entries from the current position forward until `f` returns
    /// false. Returns whether the domain was exhausted.
    pub fn for_each(&mut self, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> bool {
        while let Some((key, value)) = &self.current {
            if !f(key, value) {
                return false;
            }
            self.next();
        }
        true
    }

    /// Visit entries from the current position backward until `f` returns
    /// false.
    pub fn rfor_each(&mut self, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> bool {
        while let Some((key, value)) = &self.current {
            if !f(key, value) {
                return false;
            }
            self.prev();
        }
        true
    }
}
