mod fixtures;

use anyhow::Result;
use fakechroot::chroot::Session;
use fakechroot::util::{CommandTemplate, Lock, is_alive};
use fakechroot::{BuildState, Config, Error, FakeChroot, classify};
use fixtures::*;
use std::process::Command;
use std::time::{Duration, Instant};

/// A config that needs none of the real tools: the "bootstrap" just makes a
/// tiny tree and the session daemon is a backgrounded sleep.
fn offline_config(name: &str) -> Config {
    fakechroot::logger::init(log::LevelFilter::Warn);
    let mut config = Config::with_location(&test_data_dir().join(format!("{}-{}", name, rid())));
    config.required_tools = Vec::new();
    config.bootstrap = vec![
        CommandTemplate::new(&["mkdir", "-p", "{base_image}/etc", "{base_image}/tmp"]),
        CommandTemplate::new(&["sh", "-c", "echo base > \"$0/etc/hostname\"", "{base_image}"]),
    ];
    config.daemon = argv(&["sh", "-c", "sleep 60 >/dev/null 2>&1 & echo \"$$:$!\""]);
    config
}

fn wait_dead(pid: nix::unistd::Pid) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn test_destroy_after_failed_bootstrap() -> Result<()> {
    let mut config = offline_config("failed-bootstrap");
    config.bootstrap = vec![CommandTemplate::new(&["false"])];

    let mut chroot = FakeChroot::create(&config)?;
    let err = chroot.build().unwrap_err();
    assert!(matches!(classify(&err), Some(Error::CommandFailed { .. })));
    assert_eq!(chroot.base_image().state(), BuildState::NotBuilt);
    assert!(!config.lock_path().exists());

    assert!(chroot.destroy().is_empty());
    assert!(!chroot.path.exists());
    std::fs::remove_dir_all(&config.location)?;
    Ok(())
}

#[test]
fn test_destroy_after_partial_clone() -> Result<()> {
    let config = offline_config("partial-clone");
    let mut chroot = FakeChroot::create(&config)?;

    // Without cowdancer on the host the build stops after cloning
    let built = chroot.build();
    assert_eq!(chroot.base_image().state(), BuildState::Ready);
    assert!(chroot.chroot_path.join("etc/hostname").exists());
    if built.is_ok() {
        assert!(chroot.overlay_dir.join("sudo").exists());
    }

    assert!(chroot.destroy().is_empty());
    assert!(!chroot.path.exists());
    assert!(config.base_image.join("etc/hostname").exists());
    std::fs::remove_dir_all(&config.location)?;
    Ok(())
}

#[test]
fn test_building_twice_is_refused() -> Result<()> {
    let config = offline_config("twice");
    let mut chroot = FakeChroot::create(&config)?;
    let _ = chroot.build();
    assert!(chroot.build().is_err());
    chroot.destroy();
    std::fs::remove_dir_all(&config.location)?;
    Ok(())
}

#[test]
fn test_session_is_shared_until_last_destroy() -> Result<()> {
    let config = offline_config("shared-session");
    let mut a = FakeChroot::create(&config)?;
    let mut b = FakeChroot::create(&config)?;

    let key = a.session_key()?;
    assert_eq!(b.session_key()?, key);
    assert_eq!(a.get_env()?["FAKEROOTKEY"], key);

    let session = Session::parse(&std::fs::read_to_string(&b.faked_state_path)?)?;
    assert_eq!(session.key, key);
    assert!(is_alive(session.daemon_pid));

    // Another process attaching to `a` picks up the same session
    assert!(a.faked_state_path.exists());

    assert!(a.destroy().is_empty());
    assert!(is_alive(session.daemon_pid));
    assert!(b.destroy().is_empty());
    assert!(wait_dead(session.daemon_pid));

    std::fs::remove_dir_all(&config.location)?;
    Ok(())
}

#[test]
fn test_repeated_teardown_keeps_shared_session() -> Result<()> {
    let config = offline_config("repeated-teardown");
    let mut a = FakeChroot::create(&config)?;
    let mut b = FakeChroot::create(&config)?;
    let key = a.session_key()?;
    assert_eq!(b.session_key()?, key);
    let session = Session::parse(&std::fs::read_to_string(&a.faked_state_path)?)?;

    a.cleanup_session()?;
    a.cleanup_session()?;
    assert!(is_alive(session.daemon_pid));

    // A second handle on `a` finds the session on disk while `b` still uses it
    let mut reattached = FakeChroot::new(&config, &a.path)?;
    assert!(reattached.destroy().is_empty());
    assert!(is_alive(session.daemon_pid));
    assert!(!a.path.exists());

    assert!(a.destroy().is_empty());
    assert!(is_alive(session.daemon_pid));
    assert_eq!(b.session_key()?, key);

    assert!(b.destroy().is_empty());
    assert!(wait_dead(session.daemon_pid));
    assert!(b.destroy().is_empty());

    std::fs::remove_dir_all(&config.location)?;
    Ok(())
}

#[test]
fn test_build_waits_for_lock_held_by_other_process() -> Result<()> {
    let config = offline_config("contended");
    std::fs::create_dir_all(&config.location)?;

    let mut holder = Command::new("sleep").arg("0.5").spawn()?;
    std::fs::write(config.lock_path(), holder.id().to_string())?;
    let lock = Lock::new(&config.lock_path())?;
    assert!(lock.locked()?);
    let reaper = std::thread::spawn(move || holder.wait());

    let mut chroot = FakeChroot::create(&config)?;
    let _ = chroot.build();
    assert_eq!(chroot.base_image().state(), BuildState::Ready);
    assert!(!lock.locked()?);
    assert!(!config.lock_path().exists());

    reaper.join().map_err(|_| anyhow::anyhow!("reaper panicked"))??;
    chroot.destroy();
    std::fs::remove_dir_all(&config.location)?;
    Ok(())
}
