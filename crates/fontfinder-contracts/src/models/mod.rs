mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, DEFAULT_MODEL};
pub use selectors::{ModelSelection, ModelSelector, ANALYSIS_CAPABILITY};
