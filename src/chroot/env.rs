use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::trace;
use walkdir::WalkDir;

use super::FakeChroot;
use super::build::assert_supported;

pub const LD_PRELOAD: &str =
    "libfakechroot.so libfakeroot-sysv.so /usr/lib/cowdancer/libcowdancer.so";

pub const ROOT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Commands fakechroot swaps for something that works without real root.
const CMD_SUBST: [(&str, &str); 4] = [
    ("/usr/sbin/chroot", "/usr/sbin/chroot.fakechroot"),
    ("/sbin/ldconfig", "/bin/true"),
    ("/usr/bin/ischroot", "/bin/true"),
    ("/usr/bin/ldd", "/usr/bin/ldd.fakechroot"),
];

const ROOT_IDENTITY: [(&str, &str); 5] = [
    ("HOME", "/root"),
    ("PWD", "/"),
    ("LOGNAME", "root"),
    ("USERNAME", "root"),
    ("USER", "root"),
];

impl FakeChroot {
    /**
     * The complete environment of a process running inside the sandbox.
     *
     * Starts the fakeroot session if nothing has yet. The host environment is
     * not inherited, the only thing read from it is `FAKECHROOT_DEBUG`.
     */
    pub fn get_env(&mut self) -> Result<BTreeMap<String, String>> {
        assert_supported(&self.config)?;
        let key = self.session_key()?;
        Ok(self.assemble_env(&key))
    }

    /// `get_env` for a known session key.
    pub fn assemble_env(&self, fakeroot_key: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let mut set = |key: &str, value: String| {
            env.insert(key.to_string(), value);
        };

        let location = self.location.display().to_string();
        set("FAKECHROOT", "true".to_string());
        set(
            "FAKECHROOT_EXCLUDE_PATH",
            ["/dev", "/proc", "/sys", location.as_str()].join(":"),
        );

        let overlay = |name: &str| self.overlay_dir.join(name).display().to_string();
        let subst = CMD_SUBST
            .iter()
            .map(|(from, to)| format!("{}={}", from, to))
            .chain([
                format!("/usr/bin/sudo={}", overlay("sudo")),
                format!("/usr/bin/env={}", overlay("env")),
            ])
            .collect::<Vec<_>>();
        set("FAKECHROOT_CMD_SUBST", subst.join(":"));
        set("FAKECHROOT_BASE", self.chroot_path.display().to_string());

        if self.config.shim_debug || std::env::var_os("FAKECHROOT_DEBUG").is_some() {
            set("FAKECHROOT_DEBUG", "true".to_string());
        }

        set("FAKEROOTKEY", fakeroot_key.to_string());

        set("COWDANCER_ILISTFILE", self.ilist_path.display().to_string());
        set("COWDANCER_REUSE", "yes".to_string());

        for (key, value) in ROOT_IDENTITY {
            set(key, value.to_string());
        }
        set("PATH", ROOT_PATH.to_string());

        let libs = library_search_path(
            Path::new("/"),
            &self.chroot_path,
            self.config.use_system_libs,
        );
        set(
            "LD_LIBRARY_PATH",
            libs.iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(":"),
        );
        set("LD_PRELOAD", LD_PRELOAD.to_string());

        trace!("Environment for {}: {:?}", self.path.display(), env);
        env
    }
}

/**
 * Where the dynamic linker should find the shim libraries, in priority
 * order. `host_root` is `/` outside of tests. Directories that do not exist
 * are left out.
 */
pub fn library_search_path(host_root: &Path, chroot: &Path, use_system_libs: bool) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    for dir in ["usr/lib/fakechroot", "usr/lib64/fakechroot", "usr/lib32/fakechroot"] {
        candidates.push(host_root.join(dir));
    }
    candidates.extend(multiarch_dirs(host_root, "fakechroot"));

    candidates.push(host_root.join("usr/lib/libfakeroot"));
    candidates.extend(multiarch_dirs(host_root, "libfakeroot"));

    if use_system_libs {
        candidates.push(host_root.join("usr/lib"));
        candidates.push(host_root.join("lib"));
    }

    candidates.push(chroot.join("usr/lib"));
    candidates.push(chroot.join("lib"));

    candidates.into_iter().filter(|p| p.is_dir()).collect()
}

/// `<root>/usr/lib/*/<name>`, sorted.
fn multiarch_dirs(host_root: &Path, name: &str) -> Vec<PathBuf> {
    let lib = host_root.join("usr/lib");
    let pattern = format!("*/{}", name);

    WalkDir::new(&lib)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| {
            e.path()
                .strip_prefix(&lib)
                .ok()
                .and_then(|rel| rel.to_str())
                .is_some_and(|rel| fast_glob::glob_match(&pattern, rel))
        })
        .map(|e| e.into_path())
        .collect()
}
