/// Splits a column's keys into domains for bounded iteration.
///
/// `has` reports whether a key carries a domain prefix at all, and `get`
/// extracts it. Keys sharing a prefix are contiguous in the column.
#[derive(Clone, Copy)]
pub struct PrefixTransform {
    pub name: &'static str,
    pub has: fn(&[u8]) -> bool,
    pub get: fn(&[u8]) -> &[u8],
}

impl PrefixTransform {
    /// Prefix ending at (and including) the first occurrence of `sep`.
    pub fn split_at(key: &[u8], sep: u8) -> &[u8] {
        match key.iter().position(|&b| b == sep) {
            Some(pos) => &key[..=pos],
            None => key,
        }
    }

    pub fn domain<'k>(&self, key: &'k [u8]) -> &'k [u8] {
        if (self.has)(key) {
            (self.get)(key)
        } else {
            key
        }
    }
}

impl std::fmt::Debug for PrefixTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixTransform")
            .field("name", &self.name)
            .finish()
    }
}

/// Declares a column
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub name: &'static str,
    pub explain: &'static str,
    pub prefix: Option<PrefixTransform>,
}

impl Descriptor {
    pub const fn new(name: &'static str, explain: &'static str) -> Self {
        Self {
            name,
            explain,
            prefix: None,
        }
    }

    pub const fn with_prefix(mut self, prefix: PrefixTransform) -> Self {
        self.prefix = Some(prefix);
        self
    }
}
