mod base_image;
mod build;
mod call;
mod chroot_struct;
mod destroy;
mod env;
mod fs;
mod overlay;
mod session;
mod stat;
mod users;

pub use base_image::{BaseImage, BuildState, NoRefresh, RefreshHook};
pub use build::assert_supported;
pub use call::{CallOutput, exit_code};
pub use chroot_struct::*;
pub use env::{LD_PRELOAD, ROOT_PATH, library_search_path};
pub use fs::{OpenMode, host_path_in, sandbox_target};
pub use overlay::{OVERLAY_SCRIPTS, deploy_overlay};
pub use session::{Session, SessionManager, SessionSlot, SharedSession};
pub use stat::{StatResult, parse_terse};
pub use users::{GroupEntry, UserEntry, parse_group, parse_passwd};
