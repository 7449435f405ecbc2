//! Configuration: the generator-facing model and the project file that produces it

pub mod defaults;
mod model;
mod settings;

pub use model::*;
pub use settings::*;
