mod device_selector;
mod error;
mod plots;

pub use device_selector::device_selector;
pub use error::GuiError;
pub use plots::TuiPlots;
