pub mod algorithms;
pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod visualization;

pub use algorithms::*;
pub use analysis::*;
pub use data::*;
pub use error::{DiffractionError, Result};
pub use pipeline::*;

