//! String interning for labels, value names, and callee names.
//!
//! Interned strings live as long as the arena that owns the interner, so IR
//! objects store a cheap `Istr` handle instead of an owned `String`.

use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;

/// Handle to an interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Istr(u32);
entity_impl!(Istr, "str");

#[derive(Default)]
pub struct Interner {
    map: FxHashMap<Box<str>, Istr>,
    strings: PrimaryMap<Istr, Box<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning the existing handle if it was seen before.
    pub fn intern(&mut self, s: &str) -> Istr {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = self.strings.push(s.into());
        self.map.insert(s.into(), id);
        id
    }

    pub fn get(&self, id: Istr) -> &str {
        &self.strings[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let mut i = Interner::new();
        let a = i.intern("entry");
        let b = i.intern("exit");
        let c = i.intern("entry");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(i.get(a), "entry");
        assert_eq!(i.get(b), "exit");
    }
}
