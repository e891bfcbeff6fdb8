pub mod db;
pub mod directory;
pub mod generator;
pub mod ipc;
pub mod quota;
pub mod roster;
