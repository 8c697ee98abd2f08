//! Data structures passed between the pipeline stages.

pub mod packet;
pub mod page;
pub mod stream;
