pub mod action;
pub mod config;
pub mod error;
pub mod gate;
pub mod journal;
pub mod present;
pub mod preview;
pub mod proposal;
pub mod snapshot;

pub use action::*;
pub use config::*;
pub use error::*;
pub use gate::*;
pub use present::*;
pub use preview::*;
pub use proposal::*;
pub use snapshot::*;

pub use journal::*;
