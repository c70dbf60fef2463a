pub mod settings;

pub use settings::{EntityType, FitMode, OutputFormat, ResizeSpec};
