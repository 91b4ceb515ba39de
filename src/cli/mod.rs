pub mod analyze;
pub mod command;
pub mod loopback;
