pub mod arrange;
pub mod config;
pub mod error;
pub mod geometry;
pub mod intake;
pub mod interaction;
pub mod logging;
pub mod media;
pub mod scene;
pub mod types;
