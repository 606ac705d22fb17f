use crate::data::{AlignmentOffset, Frame};
use crate::error::Result;

/// A translation registration method usable by the stack aligner.
pub trait RegistrationAlgorithm: Send + Sync {
    /// Returns the name of the algorithm
    fn name(&self) -> &str;

    /// Displacement of `moving` relative to `reference`; both frames share a shape.
    fn register_frames(&self, reference: &Frame, moving: &Frame) -> Result<AlignmentOffset>;

    /// Whether offsets may be fractional
    fn supports_subpixel(&self) -> bool {
        false
    }
}
