pub mod stack;
pub mod traits;
pub mod types;

pub use stack::*;
pub use traits::*;
pub use types::*;
