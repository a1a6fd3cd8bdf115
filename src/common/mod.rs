pub mod bitset;
pub mod interner;
pub mod value_map;
pub mod worklist;

pub use bitset::BitSet;
pub use interner::{Interner, Istr};
pub use value_map::ValueMap;
pub use worklist::Worklist;
