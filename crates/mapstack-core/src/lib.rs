pub mod source;
pub mod types;

pub use source::{SourceError, SourceTemplate};
pub use types::*;
