pub mod analysis;
pub mod assets;
pub mod commands;
pub mod events;
pub mod models;
pub mod prompt;
