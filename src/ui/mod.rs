pub mod icons;
pub mod progress;

pub use progress::{ReviewUI, change_icon, status_icon};
