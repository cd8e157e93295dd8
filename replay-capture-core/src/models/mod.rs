pub mod config;
pub mod error;
pub mod flush_result;
pub mod media;
pub mod state;
pub mod status;
pub mod stream;
