pub mod cli;
pub mod defaults;
pub mod impls;
pub mod resolve;
pub mod structs;

pub use resolve::resolve_config;
pub use structs::*;
