//! Relational-query IR: resolved relational operators over a column arena.

pub mod types;
pub mod validate;

pub use types::*;
pub use validate::validate;
