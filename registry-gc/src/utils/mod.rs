pub mod cli;
pub mod duration;
pub mod state;
