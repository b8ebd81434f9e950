use anyhow::Result;
use serde::Serialize;

use super::FakeChroot;
use crate::error::Error;

/// File metadata as the sandbox sees it (fake owners, fake modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatResult {
    pub st_mode: u32,
    pub st_ino: u64,
    pub st_dev: u64,
    pub st_nlink: u64,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_size: u64,
    pub st_atime: i64,
    pub st_mtime: i64,
    pub st_ctime: i64,
}

impl StatResult {
    /// Permission bits including setuid, setgid and sticky.
    pub fn permissions(&self) -> u32 {
        self.st_mode & 0o7777
    }

    pub fn file_type(&self) -> u32 {
        self.st_mode & libc::S_IFMT
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == libc::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == libc::S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == libc::S_IFLNK
    }
}

/**
 * Parses `stat -t` output for `path`.
 *
 * The terse format is the name followed by size, blocks, mode (hex), uid,
 * gid, device (hex), inode, links, major and minor (hex), then atime, mtime
 * and ctime. The name may contain spaces, so it is stripped off by value.
 */
pub fn parse_terse(path: &str, output: &str) -> Result<StatResult> {
    let failed = |reason: String| Error::StatFailed {
        path: path.to_string(),
        reason,
    };

    let line = output.lines().next().unwrap_or_default();
    let fields: Vec<&str> = match line.strip_prefix(path) {
        Some(rest) if rest.starts_with(' ') => rest.split_whitespace().collect(),
        _ => line.split_whitespace().skip(1).collect(),
    };
    if fields.len() < 13 {
        return Err(failed(format!("unexpected output {:?}", output)).into());
    }

    let dec = |index: usize, name: &str| -> Result<u64, Error> {
        fields[index]
            .parse::<u64>()
            .map_err(|_| failed(format!("bad {} {:?}", name, fields[index])))
    };
    let hex = |index: usize, name: &str| -> Result<u64, Error> {
        u64::from_str_radix(fields[index], 16)
            .map_err(|_| failed(format!("bad {} {:?}", name, fields[index])))
    };
    let time = |index: usize, name: &str| -> Result<i64, Error> {
        fields[index]
            .parse::<i64>()
            .map_err(|_| failed(format!("bad {} {:?}", name, fields[index])))
    };
    let narrow = |value: u64, name: &str| -> Result<u32, Error> {
        u32::try_from(value).map_err(|_| failed(format!("{} out of range", name)))
    };

    Ok(StatResult {
        st_size: dec(0, "size")?,
        st_mode: narrow(hex(2, "mode")?, "mode")?,
        st_uid: narrow(dec(3, "uid")?, "uid")?,
        st_gid: narrow(dec(4, "gid")?, "gid")?,
        st_dev: hex(5, "device")?,
        st_ino: dec(6, "inode")?,
        st_nlink: dec(7, "link count")?,
        st_atime: time(10, "atime")?,
        st_mtime: time(11, "mtime")?,
        st_ctime: time(12, "ctime")?,
    })
}

impl FakeChroot {
    /// Metadata of `path`, following symlinks.
    pub fn stat(&mut self, path: &str) -> Result<StatResult> {
        self.run_stat(&["stat", "-L", "-t", path], path)
    }

    /// Metadata of `path` itself.
    pub fn lstat(&mut self, path: &str) -> Result<StatResult> {
        self.run_stat(&["stat", "-t", path], path)
    }

    fn run_stat(&mut self, argv: &[&str], path: &str) -> Result<StatResult> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let output = self.check_call(&argv)?;
        if !output.success() {
            let stderr = output.stderr_str();
            let reason = match stderr.trim() {
                "" => format!("stat exited with {}", output.code),
                msg => msg.to_string(),
            };
            return Err(Error::StatFailed {
                path: path.to_string(),
                reason,
            }
            .into());
        }
        parse_terse(path, &output.stdout_str())
    }
}
