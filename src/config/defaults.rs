use crate::util::CommandTemplate;
use std::path::PathBuf;

pub const DEFAULT_DISTRO: &str = "precise";

/// Distros the default bootstrap recipe is known to work with.
pub const SUPPORTED_DISTROS: [&str; 4] = ["lucid", "precise", "quantal", "raring"];

pub const DEFAULT_PACKAGES: [&str; 8] = [
    "subversion",
    "git-core",
    "python-setuptools",
    "python-dateutil",
    "ubuntu-keyring",
    "gpgv",
    "python-dev",
    "build-essential",
];

pub const REQUIRED_TOOLS: [&str; 4] = [
    "/usr/bin/fakeroot",
    "/usr/bin/fakechroot",
    "/usr/sbin/debootstrap",
    "/usr/bin/cow-shell",
];

pub const DEFAULT_DAEMON: [&str; 1] = ["faked-sysv"];

pub fn default_bootstrap() -> Vec<CommandTemplate> {
    vec![
        CommandTemplate::new(&[
            "fakeroot",
            "fakechroot",
            "debootstrap",
            "--variant=fakechroot",
            "--include={include}",
            "{distro}",
            "{base_image}",
        ]),
        CommandTemplate::new(&[
            "fakeroot",
            "fakechroot",
            "/usr/sbin/chroot",
            "{base_image}",
            "apt-get",
            "update",
        ]),
    ]
}

pub fn default_packages() -> Vec<String> {
    DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect()
}

pub fn default_required_tools() -> Vec<PathBuf> {
    REQUIRED_TOOLS.iter().map(PathBuf::from).collect()
}

pub fn default_daemon() -> Vec<String> {
    DEFAULT_DAEMON.iter().map(|p| p.to_string()).collect()
}
