pub mod detector;
pub mod model;
pub mod region;

pub use detector::{DetectionParams, Detector};
pub use model::{CascadeDescriptor, CascadeModel, IntegralImage};
pub use region::{DetectionRegion, Rect};
