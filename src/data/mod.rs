pub mod frame;
pub mod transformer;

pub use frame::*;
pub use transformer::*;
