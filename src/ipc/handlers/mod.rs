pub mod core;
pub mod questions;
pub mod roster;
pub mod setup;
pub mod students;
pub mod units;
