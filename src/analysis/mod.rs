pub mod clone;
pub mod domtree;
pub mod loops;

pub use domtree::{compute_dom_tree_timestamps, compute_dominator_tree};
pub use loops::{find_natural_loops, loops_sorted_by_depth};
