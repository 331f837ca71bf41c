#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Set,
    Delete,
    /// Delete every key in `[key, value)`
    DeleteRange,
}

/// One staged write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub op: Op,
    pub column: &'static str,
    pub key: Vec<u8>,
    /// The value for `Set`, the exclusive range end for `DeleteRange`, and
    /// empty for `Delete`
    pub value: Vec<u8>,
}

impl Delta {
    pub fn set(column: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            op: Op::Set,
            column,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(column: &'static str, key: impl Into<Vec<u8>>) -> Self {
        Self {
            op: Op::Delete,
            column,
            key: key.into(),
            value: Vec::new(),
        }
    }

    pub fn delete_range(
        column: &'static str,
        begin: impl Into<Vec<u8>>,
        end: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            op: Op::DeleteRange,
            column,
            key: begin.into(),
            value: end.into(),
        }
    }

    pub fn bytes(&self) -> usize {
        self.key.len() + self.value.len()
    }

    fn covers(&self, column: &str, key: &[u8]) -> bool {
        if self.column != column {
            return false;
        }

        match self.op {
            Op::DeleteRange => key >= self.key.as_slice() && key < self.value.as_slice(),
            _ => self.key == key,
        }
    }
}

/// An ordered batch of writes committed as a unit by
/// [`Database::commit`](crate::Database::commit).
///
/// Staged writes can be inspected before commit, so that code building a
/// transaction can observe its own earlier writes.
#[derive(Debug, Clone, Default)]
pub struct Txn {
    deltas: Vec<Delta>,
    bytes: usize,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(reserve: usize) -> Self {
        Self {
            deltas: Vec::with_capacity(reserve),
            bytes: 0,
        }
    }

    pub fn append(&mut self, delta: Delta) {
        self.bytes += delta.bytes();
        self.deltas.push(delta);
    }

    pub fn set(&mut self, column: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.append(Delta::set(column, key, value));
    }

    pub fn delete(&mut self, column: &'static str, key: impl Into<Vec<u8>>) {
        self.append(Delta::delete(column, key));
    }

    pub fn delete_range(
        &mut self,
        column: &'static str,
        begin: impl Into<Vec<u8>>,
        end: impl Into<Vec<u8>>,
    ) {
        self.append(Delta::delete_range(column, begin, end));
    }

    /// Number of staged deltas
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Total key and value bytes staged
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn has(&self, op: Op, column: &str, key: &[u8]) -> bool {
        self.deltas
            .iter()
            .any(|d| d.op == op && d.column == column && d.key == key)
    }

    /// The staged state of `key`: `Some(Some(value))` if the last write to
    /// it sets a value, `Some(None)` if it deletes it, and `None` if the
    /// transaction does not touch it.
    pub fn val(&self, column: &str, key: &[u8]) -> Option<Option<&[u8]>> {
        self.deltas
            .iter()
            .rev()
            .find(|d| d.covers(column, key))
            .map(|d| match d.op {
                Op::Set => Some(d.value.as_slice()),
                Op::Delete | Op::DeleteRange => None,
            })
    }

    /// Visit deltas in order until `f` returns false. Returns whether every
    /// delta was visited.
    pub fn for_each(&self, mut f: impl FnMut(&Delta) -> bool) -> bool {
        self.deltas.iter().all(|d| f(d))
    }

    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    pub fn clear(&mut self) {
        self.deltas.clear();
        self.bytes = 0;
    }
}
