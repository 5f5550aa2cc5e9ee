pub mod app;
pub mod audio;
pub mod config;
pub mod player;
pub mod queue;
mod ui;
