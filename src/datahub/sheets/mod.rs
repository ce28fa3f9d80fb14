pub mod config;
pub mod error;
pub mod io;
pub mod merge;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod validate;

pub use error::{Result, SheetError};
