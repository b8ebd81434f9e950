use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

pub fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow!("HOME is not set, cannot expand '~'"))?;
    let home = PathBuf::from(home);
    if !home.is_absolute() {
        return Err(anyhow!(
            "Home directory is not absolute: {:?}",
            home.display()
        ));
    }
    Ok(home)
}

/// Expands a leading `~` or `~/` to the home directory. `~user` is left alone.
pub fn expand_tilde_path(path: &Path) -> Result<PathBuf> {
    let Some(path_str) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if path_str == "~" {
        return home_dir();
    }
    if let Some(rest) = path_str.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_path() {
        let home = home_dir().unwrap();
        assert_eq!(expand_tilde_path(Path::new("~")).unwrap(), home);
        assert_eq!(
            expand_tilde_path(Path::new("~/.fakechroot")).unwrap(),
            home.join(".fakechroot")
        );
        assert_eq!(
            expand_tilde_path(Path::new("~/a/b")).unwrap(),
            home.join("a").join("b")
        );
    }

    #[test]
    fn test_expand_tilde_path_untouched() {
        assert_eq!(
            expand_tilde_path(Path::new("/srv/chroots")).unwrap(),
            PathBuf::from("/srv/chroots")
        );
        assert_eq!(
            expand_tilde_path(Path::new("~other/x")).unwrap(),
            PathBuf::from("~other/x")
        );
    }
}
