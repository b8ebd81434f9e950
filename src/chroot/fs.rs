use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::trace;

use super::FakeChroot;
use crate::error::Error;
use crate::util::command::describe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate
    Write,
    /// Create or append
    Append,
}

/// Host location of sandbox-absolute `path` inside `root`. `..` stops at the
/// sandbox root, as it does inside a chroot.
pub fn host_path_in(root: &Path, path: &str) -> PathBuf {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => (),
            ".." => {
                components.pop();
            }
            name => components.push(name),
        }
    }
    let mut host = root.to_path_buf();
    host.extend(components);
    host
}

/// Maps a host symlink target back into the sandbox when it points inside it.
pub fn sandbox_target(root: &Path, target: &Path) -> String {
    match target.strip_prefix(root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => target.display().to_string(),
    }
}

/**
 * Filesystem access by sandbox-absolute path.
 *
 * Plain reads, writes and existence checks go straight to the clone on the
 * host. `stat`, `lstat` and `chmod` run inside the sandbox instead, since
 * fakeroot keeps the faked ownership and modes to itself.
 */
impl FakeChroot {
    pub fn host_path(&self, path: &str) -> PathBuf {
        host_path_in(&self.chroot_path, path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.host_path(path).exists()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.host_path(path).is_dir()
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.host_path(path).is_file()
    }

    pub fn is_symlink(&self, path: &str) -> bool {
        self.host_path(path).is_symlink()
    }

    /// Like `exists` but true for dangling symlinks.
    pub fn lexists(&self, path: &str) -> bool {
        self.host_path(path).symlink_metadata().is_ok()
    }

    pub fn open(&self, path: &str, mode: OpenMode) -> Result<File> {
        let host = self.host_path(path);
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };
        options
            .open(&host)
            .context(format!("Failed to open {} in {}", path, self.path.display()))
    }

    pub fn get(&self, path: &str) -> Result<String> {
        std::fs::read_to_string(self.host_path(path))
            .context(format!("Failed to read {} in {}", path, self.path.display()))
    }

    pub fn put(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let mut file = self.open(path, OpenMode::Write)?;
        file.write_all(contents.as_ref())
            .context(format!("Failed to write {} in {}", path, self.path.display()))
    }

    /// Creates an empty file unless something is already there.
    pub fn touch(&self, path: &str) -> Result<()> {
        if !self.exists(path) {
            self.put(path, "")?;
        }
        Ok(())
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        std::fs::create_dir(self.host_path(path))
            .context(format!("Failed to create {} in {}", path, self.path.display()))
    }

    pub fn makedirs(&self, path: &str) -> Result<()> {
        std::fs::create_dir_all(self.host_path(path))
            .context(format!("Failed to create {} in {}", path, self.path.display()))
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        std::fs::remove_file(self.host_path(path))
            .context(format!("Failed to remove {} in {}", path, self.path.display()))
    }

    /// Changes the mode as fakeroot sees it, by running chmod in the sandbox.
    pub fn chmod(&mut self, path: &str, mode: u32) -> Result<()> {
        let argv = vec!["chmod".to_string(), format!("{:04o}", mode), path.to_string()];
        let output = self.check_call(&argv)?;
        if !output.success() {
            return Err(Error::CommandFailed {
                command: describe(&argv),
                status: format!("exit code {}: {}", output.code, output.stderr_str().trim()),
            }
            .into());
        }
        Ok(())
    }

    /// Makes `dest` a symlink to `source`, stored as a host path.
    pub fn symlink(&self, source: &str, dest: &str) -> Result<()> {
        trace!("Linking {} -> {} in {}", dest, source, self.path.display());
        std::os::unix::fs::symlink(self.host_path(source), self.host_path(dest)).context(
            format!("Failed to link {} to {} in {}", dest, source, self.path.display()),
        )
    }

    /// The target of symlink `path`, as a sandbox path when it points inside.
    pub fn readlink(&self, path: &str) -> Result<String> {
        let target = std::fs::read_link(self.host_path(path))
            .context(format!("Failed to read link {} in {}", path, self.path.display()))?;
        Ok(sandbox_target(&self.chroot_path, &target))
    }

    /**
     * Writes `contents` to a new uniquely named file in the sandbox's `/tmp`.
     * Returns the host path and the path seen from inside the sandbox.
     */
    pub fn write_temporary_file(&self, contents: impl AsRef<[u8]>) -> Result<(PathBuf, String)> {
        let name = format!("tmp{}", uuid::Uuid::new_v4().simple());
        let inside = format!("/tmp/{}", name);
        let host = self.host_path(&inside);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&host)
            .context(format!("Failed to create {}", host.display()))?;
        file.write_all(contents.as_ref())
            .context(format!("Failed to write {}", host.display()))?;
        Ok((host, inside))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::io::Read;

    fn with_clone<F: FnOnce(&FakeChroot)>(test: F) {
        let dir = std::env::temp_dir()
            .join(format!("fakechroot-fs-tests-{}", uuid::Uuid::new_v4()));
        let config = Config::with_location(&dir);
        let chroot = FakeChroot::new(&config, &dir.join("instance")).unwrap();
        std::fs::create_dir_all(chroot.chroot_path.join("tmp")).unwrap();
        std::fs::create_dir_all(chroot.chroot_path.join("etc")).unwrap();
        test(&chroot);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_host_path_joins_components() {
        let root = Path::new("/srv/x/chroot");
        assert_eq!(host_path_in(root, "/etc/passwd"), root.join("etc/passwd"));
        assert_eq!(host_path_in(root, "etc//passwd"), root.join("etc/passwd"));
        assert_eq!(host_path_in(root, "/"), root);
        assert_eq!(host_path_in(root, "/./tmp/"), root.join("tmp"));
    }

    #[test]
    fn test_host_path_never_escapes_root() {
        let root = Path::new("/srv/x/chroot");
        assert_eq!(host_path_in(root, "/../../etc/shadow"), root.join("etc/shadow"));
        assert_eq!(host_path_in(root, ".."), root);
        assert_eq!(host_path_in(root, "/usr/lib/../bin"), root.join("usr/bin"));
        assert_eq!(host_path_in(root, "/tmp/../../../.."), root);
    }

    #[test]
    fn test_sandbox_target() {
        let root = Path::new("/srv/x/chroot");
        assert_eq!(sandbox_target(root, &root.join("etc")), "/etc");
        assert_eq!(sandbox_target(root, root), "/");
        assert_eq!(sandbox_target(root, Path::new("/usr/share")), "/usr/share");
        assert_eq!(sandbox_target(root, Path::new("relative/x")), "relative/x");
    }

    #[test]
    fn test_parent_components_stay_in_clone() {
        with_clone(|chroot| {
            // the host has /etc/passwd, the clone does not
            assert!(!chroot.exists("/../../../etc/passwd"));
            assert!(chroot.is_dir("/tmp/../etc"));
            chroot.put("/../../tmp/inside", "x").unwrap();
            assert!(chroot.chroot_path.join("tmp/inside").exists());
        });
    }

    #[test]
    fn test_put_get_touch() {
        with_clone(|chroot| {
            chroot.put("/tmp/a", "hello").unwrap();
            assert_eq!(chroot.get("/tmp/a").unwrap(), "hello");
            assert!(chroot.is_file("/tmp/a"));

            chroot.touch("/tmp/a").unwrap();
            assert_eq!(chroot.get("/tmp/a").unwrap(), "hello");
            chroot.touch("/tmp/b").unwrap();
            chroot.touch("/tmp/b").unwrap();
            assert_eq!(chroot.get("/tmp/b").unwrap(), "");

            let mut file = chroot.open("/tmp/a", OpenMode::Append).unwrap();
            file.write_all(b" world").unwrap();
            let mut text = String::new();
            chroot
                .open("/tmp/a", OpenMode::Read)
                .unwrap()
                .read_to_string(&mut text)
                .unwrap();
            assert_eq!(text, "hello world");

            chroot.unlink("/tmp/a").unwrap();
            assert!(!chroot.exists("/tmp/a"));
            assert!(chroot.get("/tmp/a").is_err());
        });
    }

    #[test]
    fn test_directories() {
        with_clone(|chroot| {
            assert!(chroot.is_dir("/"));
            assert!(chroot.is_dir("/etc"));
            chroot.mkdir("/srv").unwrap();
            assert!(chroot.mkdir("/srv").is_err());
            assert!(chroot.mkdir("/a/b").is_err());
            chroot.makedirs("/a/b/c").unwrap();
            assert!(chroot.is_dir("/a/b/c"));
        });
    }

    #[test]
    fn test_symlink_round_trip() {
        with_clone(|chroot| {
            chroot.symlink("/etc", "/etc2").unwrap();
            assert!(chroot.is_symlink("/etc2"));
            assert!(chroot.is_dir("/etc2"));
            assert_eq!(chroot.readlink("/etc2").unwrap(), "/etc");

            chroot.symlink("/missing", "/dangling").unwrap();
            assert!(!chroot.exists("/dangling"));
            assert!(chroot.lexists("/dangling"));
        });
    }

    #[test]
    fn test_write_temporary_file() {
        with_clone(|chroot| {
            let (host, inside) = chroot.write_temporary_file("payload").unwrap();
            assert!(inside.starts_with("/tmp/tmp"));
            assert_eq!(chroot.host_path(&inside), host);
            assert_eq!(chroot.get(&inside).unwrap(), "payload");

            let (other, _) = chroot.write_temporary_file("payload").unwrap();
            assert_ne!(host, other);
        });
    }
}
