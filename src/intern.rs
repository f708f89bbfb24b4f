use std::collections::HashMap;
use std::sync::Arc;

/// Insertion-order string interner handing out dense ids.
///
/// Every distinct string is stored once behind an `Arc`, so callers holding
/// a resolved handle can compare repeats with `Arc::ptr_eq` instead of
/// re-hashing.
#[derive(Debug, Default)]
pub(crate) struct StringTable {
    ids: HashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

impl StringTable {
    pub fn new() -> StringTable {
        StringTable::default()
    }

    /// Returns the id for `s`, allocating the next dense id on first use.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        let shared: Arc<str> = Arc::from(s);
        self.strings.push(shared.clone());
        self.ids.insert(shared, id);
        id
    }

    /// Returns the shared handle for `s`, interning it on first use.
    pub fn resolve(&mut self, s: &str) -> Arc<str> {
        let id = self.intern(s);
        self.strings[id as usize].clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.strings.iter()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.strings.clear();
    }
}
