pub mod decay;
pub mod peaks;

pub use decay::*;
pub use peaks::*;
