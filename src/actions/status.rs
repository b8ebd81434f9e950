use anyhow::Result;
use fakechroot::config::Config;
use fakechroot::outln;
use fakechroot::util::{Lock, set_json_output};
use log::trace;
use serde_json::{Value, json};

pub fn status(config: &Config) -> Result<()> {
    let lock_path = config.lock_path();
    trace!("Status of base image {}", config.base_image.display());

    let holder = match Lock::new(&lock_path) {
        Ok(lock) => lock.holder()?,
        // The location does not exist yet, so nobody can hold the lock
        Err(_) => None,
    };
    let exists = config.base_image.is_dir();

    outln!("Base image: {}", config.base_image.display());
    outln!("Distro:     {}", config.distro);
    outln!("Built:      {}", if exists { "yes" } else { "no" });
    match holder {
        Some(pid) => outln!("Lock:       held by {} ({})", pid, lock_path.display()),
        None => outln!("Lock:       free"),
    }

    set_json_output(
        "base_image",
        json!({
            "path": config.base_image.display().to_string(),
            "distro": config.distro,
            "built": exists,
            "lock_path": lock_path.display().to_string(),
            "lock_holder": holder.map(|pid| pid.as_raw()),
        }),
    );
    set_json_output("location", Value::String(config.location.display().to_string()));
    Ok(())
}
