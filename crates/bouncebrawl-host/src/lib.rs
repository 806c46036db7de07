pub mod command;
pub mod config;
pub mod protocol;
pub mod session_loop;
