pub mod hook;
pub mod trigger;
