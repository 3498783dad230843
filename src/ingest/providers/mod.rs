pub mod http;
pub mod memory;
pub mod synthetic;
