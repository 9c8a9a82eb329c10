#![forbid(unsafe_code)]

pub mod model;
pub mod statistics;
pub mod time;

pub use time::Clock;
