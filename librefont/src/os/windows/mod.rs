pub mod memory;
pub mod winapi;
