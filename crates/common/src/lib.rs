//! Common crate
//!
//! Error handling and configuration shared by the Tundra connector crates.
//!
//! # Example
//! ```rust
//! use tundra_common::Error;
//! let err = Error::InvalidArgument("parallelism must be at least 1".to_string());
//! assert!(err.to_string().contains("parallelism"));
//! ```

pub mod config;
pub mod error;

pub use config::{ConnectionOptions, ReadOptions, Settings, SinkOptions, TaskMode};
pub use error::{BoxError, Error, Result};
