#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

pub mod analysis;
pub mod calibration;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod estimate;
pub mod specification;
pub mod trace;
pub mod transfer;
pub mod uncertain;

pub use error::Error;
pub use uncertain::UncertainValue;

pub type Result<T> = ::std::result::Result<T, Error>;
