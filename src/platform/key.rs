//! Sidecar files and name-to-key derivation for SysV objects.
//!
//! SysV semaphores are addressed by integer keys, not names. To give them a
//! textual namespace, every name maps to a sidecar file under the crate temp
//! directory; the key is derived from the sidecar's inode the way `ftok(3)`
//! does it. Any process deriving a key for the same name reaches the same
//! sidecar, and therefore the same kernel object.

use std::fs::OpenOptions;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::PathBuf;

use crate::error::{Result, ResultExt};
use crate::platform::validate_name;

/// Project byte mixed into derived keys, in the `ftok` position.
const PROJ_ID: u64 = 0x70; // 'p'

/// Returns the crate's temp directory, creating it on first use.
///
/// Hosts both sidecar files and the emulated file-backed regions.
pub fn tmp_dir() -> Result<PathBuf> {
    let dir = std::env::temp_dir().join("procsync");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating temp dir {}", dir.display()))?;
    Ok(dir)
}

/// Returns the sidecar path for `name`, without creating anything.
pub fn tmp_filename(name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    Ok(tmp_dir()?.join(name))
}

/// Derives a stable SysV key for `name`.
///
/// Creates the sidecar file if it is absent and folds its device and inode
/// numbers into a key: low 16 bits of the inode, low 8 bits of the device,
/// and a fixed project byte, matching the published `ftok` recipe.
pub fn key_for_name(name: &str) -> Result<i32> {
    let path = tmp_filename(name)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o666)
        .open(&path)
        .with_context(|| format!("creating key sidecar {}", path.display()))?;
    let meta = file
        .metadata()
        .with_context(|| format!("reading key sidecar {}", path.display()))?;
    let key = (meta.ino() & 0xffff) | ((meta.dev() & 0xff) << 16) | (PROJ_ID << 24);
    Ok(key as i32)
}

/// Removes the sidecar file for `name`. Absence is not an error.
pub fn remove_sidecar(name: &str) -> Result<()> {
    let path = tmp_filename(name)?;
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(crate::error::Error::from(e)
                .with_context(format!("removing key sidecar {}", path.display())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_for_a_name() {
        let name = "procsync-test-key-stable";
        let k1 = key_for_name(name).expect("first derivation");
        let k2 = key_for_name(name).expect("second derivation");
        assert_eq!(k1, k2);
        remove_sidecar(name).expect("cleanup");
    }

    #[test]
    fn keys_differ_across_names() {
        let k1 = key_for_name("procsync-test-key-a").expect("key a");
        let k2 = key_for_name("procsync-test-key-b").expect("key b");
        assert_ne!(k1, k2);
        remove_sidecar("procsync-test-key-a").expect("cleanup a");
        remove_sidecar("procsync-test-key-b").expect("cleanup b");
    }

    #[test]
    fn remove_sidecar_is_idempotent() {
        let name = "procsync-test-key-gone";
        key_for_name(name).expect("create");
        remove_sidecar(name).expect("first remove");
        remove_sidecar(name).expect("second remove");
    }

    #[test]
    fn sidecar_rejects_bad_names() {
        assert!(tmp_filename("a/b").is_err());
        assert!(key_for_name("").is_err());
    }
}
