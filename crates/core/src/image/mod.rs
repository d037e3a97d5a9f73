//! Image records and the content diff planner.

mod plan;
mod types;

pub use plan::{ImagePlan, PendingUpload, plan_images};
pub use types::{Image, ImagePlacement, NewImage, select_thumbnail};
