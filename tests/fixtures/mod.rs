mod fixture_chroot;

#[allow(unused_imports)]
pub use fixture_chroot::*;
