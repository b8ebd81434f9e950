#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::useless_format
)]
#![cfg_attr(
    not(test),
    deny(
        clippy::get_unwrap,
        clippy::panic,
        clippy::print_stdout,
        clippy::unwrap_used,
        clippy::used_underscore_binding,
        clippy::used_underscore_items
    )
)]

//! Root-less "fake chroot" sandboxes for test suites.
//!
//! A [`FakeChroot`] is a hardlink clone of a shared, debootstrapped base
//! image. Commands run inside it under `fakechroot`, `fakeroot` and
//! `cowdancer`, so they see a root filesystem they own as root while writes
//! never reach the base image.

pub mod chroot;
pub mod config;
pub mod error;
pub mod logger;
pub mod util;

pub use chroot::{
    BaseImage, BuildState, CallOutput, FakeChroot, GroupEntry, NoRefresh, OpenMode,
    RefreshHook, StatResult, UserEntry,
};
pub use config::{Config, ConfigOverrides, MissingToolPolicy, resolve_config};
pub use error::{Error, classify};
pub use util::CleanupStack;
