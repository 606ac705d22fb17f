pub mod masks;
pub mod powder;
pub mod symmetry;

pub use masks::*;
pub use powder::*;
pub use symmetry::*;
