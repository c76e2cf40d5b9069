pub mod executor;
pub mod oracle;
pub mod pipeline;

pub use executor::*;
pub use oracle::*;
pub use pipeline::*;
