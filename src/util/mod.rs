mod cleanup;
pub mod command;
mod expand_tilde;
mod lock;
mod output;
mod process;

pub use cleanup::CleanupStack;
pub use command::CommandTemplate;
pub use expand_tilde::{expand_tilde_path, home_dir};
pub use lock::{LOCK_POLL_INTERVAL, LOCK_RETRIES, Lock};
pub use output::{
    json_output, print_json_output, print_output, set_json_output,
    set_should_print_output,
};
pub use process::{is_alive, terminate};
