use anyhow::{Context, Result};
use log::trace;
use serde::Serialize;

use super::FakeChroot;
use crate::error::Error;

/// A line of the sandbox's `/etc/passwd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEntry {
    pub name: String,
    pub password: String,
    pub uid: String,
    pub gid: String,
    pub gecos: String,
    pub home: String,
    pub shell: String,
}

/// A line of the sandbox's `/etc/group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEntry {
    pub name: String,
    pub password: String,
    pub gid: String,
    pub members: String,
}

impl GroupEntry {
    pub fn member_list(&self) -> Vec<&str> {
        self.members.split(',').filter(|m| !m.is_empty()).collect()
    }
}

fn records(contents: &str, width: usize) -> impl Iterator<Item = Vec<&str>> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(move |line| {
            let fields: Vec<&str> = line.splitn(width, ':').collect();
            if fields.len() == width {
                Some(fields)
            } else {
                trace!("Ignoring malformed line {:?}", line);
                None
            }
        })
}

pub fn parse_passwd(contents: &str) -> Vec<UserEntry> {
    records(contents, 7)
        .map(|f| UserEntry {
            name: f[0].to_string(),
            password: f[1].to_string(),
            uid: f[2].to_string(),
            gid: f[3].to_string(),
            gecos: f[4].to_string(),
            home: f[5].to_string(),
            shell: f[6].to_string(),
        })
        .collect()
}

pub fn parse_group(contents: &str) -> Vec<GroupEntry> {
    records(contents, 4)
        .map(|f| GroupEntry {
            name: f[0].to_string(),
            password: f[1].to_string(),
            gid: f[2].to_string(),
            members: f[3].to_string(),
        })
        .collect()
}

impl FakeChroot {
    pub fn get_user(&self, name: &str) -> Result<UserEntry> {
        let contents = self.get("/etc/passwd").context("Reading /etc/passwd")?;
        parse_passwd(&contents)
            .into_iter()
            .find(|user| user.name == name)
            .ok_or_else(|| {
                Error::NotFound {
                    database: "passwd",
                    key: name.to_string(),
                }
                .into()
            })
    }

    pub fn get_group(&self, name: &str) -> Result<GroupEntry> {
        let contents = self.get("/etc/group").context("Reading /etc/group")?;
        parse_group(&contents)
            .into_iter()
            .find(|group| group.name == name)
            .ok_or_else(|| {
                Error::NotFound {
                    database: "group",
                    key: name.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::classify;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/bin/sh

# local accounts
broken-line
www-data:x:33:33:www-data:/var/www:/bin/sh
";

    const GROUP: &str = "\
root:x:0:
adm:x:4:syslog,ubuntu
";

    #[test]
    fn test_parse_passwd() {
        let users = parse_passwd(PASSWD);
        assert_eq!(users.len(), 3);
        assert_eq!(users[0].home, "/root");
        assert_eq!(users[0].uid, "0");
        assert_eq!(users[2].name, "www-data");
        assert_eq!(users[2].shell, "/bin/sh");
    }

    #[test]
    fn test_parse_group() {
        let groups = parse_group(GROUP);
        assert_eq!(groups[0].gid, "0");
        assert!(groups[0].member_list().is_empty());
        assert_eq!(groups[1].member_list(), vec!["syslog", "ubuntu"]);
    }

    #[test]
    fn test_lookups_read_the_clone() {
        let dir = std::env::temp_dir()
            .join(format!("fakechroot-users-tests-{}", uuid::Uuid::new_v4()));
        let config = Config::with_location(&dir);
        let chroot = FakeChroot::new(&config, &dir.join("instance")).unwrap();
        std::fs::create_dir_all(chroot.chroot_path.join("etc")).unwrap();
        std::fs::write(chroot.chroot_path.join("etc/passwd"), PASSWD).unwrap();
        std::fs::write(chroot.chroot_path.join("etc/group"), GROUP).unwrap();

        assert_eq!(chroot.get_user("root").unwrap().home, "/root");
        assert_eq!(chroot.get_group("root").unwrap().gid, "0");

        let err = chroot.get_user("nobody").unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(Error::NotFound { database: "passwd", .. })
        ));
        let err = chroot.get_group("wheel").unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(Error::NotFound { database: "group", .. })
        ));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
