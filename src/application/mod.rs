mod aggregation;
mod borrowing;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod service;
pub mod settlement;

pub use error::*;
pub use pipeline::*;
pub use report::*;
pub use service::*;
pub use settlement::*;
