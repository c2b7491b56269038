//! Optimization and lowering passes
//!
//! Every pass mutates a single function in place and leaves the edge lists
//! and use-lists consistent when it returns.

pub mod blocks;
pub mod dot;
pub mod fold;
pub mod load_store;
pub mod select;

pub use blocks::{remove_only_jump_blocks, remove_unreachable_blocks};
pub use dot::{write_dot, DotConfig};
pub use fold::{constant_folding, constant_propagation};
pub use load_store::{remove_load, remove_store, remove_unused};
pub use select::{select_instructions, SelectConfig};

use crate::function::Function;
use crate::printer::print_cfg;
use log::info;

/// Log the CFG edge dump of a function
pub fn text(func: &mut Function) {
    info!("\n{}", print_cfg(func));
}
