pub mod cli;
pub mod error;
pub mod logging;
pub mod playback;
pub mod settings;
pub mod storage;
pub mod story;
