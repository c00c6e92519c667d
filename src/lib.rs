pub mod comms;
pub mod config;
pub mod driver;
pub mod hal;
