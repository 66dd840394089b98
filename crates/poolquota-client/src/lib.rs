pub mod calendar;
pub mod commands;
pub mod contracts;
pub mod error;
pub mod migrations;
pub mod population;
pub mod quota;
pub mod report;
pub mod state;
pub mod store;

pub use contracts::envelope::SuccessEnvelope;
pub use error::{ClientError, ClientResult};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");
