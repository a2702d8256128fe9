//! Application layer: settings, headless view models, step-by-step playback
//! and the [`Session`] that wires them to one store and bus.

pub mod selection;
pub mod session;
pub mod settings;
pub mod step;
pub mod views;

pub use selection::SelectionManager;
pub use session::Session;
pub use settings::{PlaybackSettings, Settings, SettingsError};
pub use step::{PlaybackTick, StepByStepPlayController, run_autoplay};
pub use views::{DATA_NOT_AVAILABLE, FlameFrame, FlameGraphView, TreeListView, TreeRow};
