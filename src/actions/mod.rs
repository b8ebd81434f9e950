mod build;
mod config;
mod destroy;
mod env;
mod run;
mod status;

pub use build::*;
pub use config::*;
pub use destroy::*;
pub use env::*;
pub use run::*;
pub use status::*;
