pub mod config;
pub mod error;
pub mod frame;
pub mod model;
pub mod stream;
pub mod tool;
pub mod trace;

pub use error::{Error, ErrorKind, Result};
