pub mod agents;
pub mod batch;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod io;
pub mod quota;
pub mod report;
pub mod scheduler;
pub mod sim;
pub mod store;
pub mod submit;
pub mod types;

pub use error::{Result, SlotError};
