use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Windows `ERROR_NOT_SAME_DEVICE`.
#[cfg(windows)]
const ERROR_NOT_SAME_DEVICE: i32 = 17;

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// The parent directory is created if missing. The file will either have the
/// old contents or the new contents, never a partial write.
///
/// # Errors
/// Returns an error if the write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    // Temp file lives next to the target so the rename stays on one filesystem
    let mut temp_path = parent.to_path_buf();
    temp_path.push(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // On Windows, rename can fail if target exists. Try copy + remove as fallback.
            if cfg!(windows) {
                fs::copy(&temp_path, path)?;
                let _ = fs::remove_file(&temp_path);
                Ok(())
            } else {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

/// Copy `src` to `dst`, failing if `dst` already exists.
///
/// The byte copy goes through `io::copy` between two files, which on Linux
/// uses `copy_file_range` and therefore clones extents on copy-on-write
/// filesystems. Permissions are carried over.
///
/// # Errors
/// Returns `AlreadyExists` if `dst` exists, or any error from opening,
/// copying or setting permissions.
pub fn copy_exclusive(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let permissions = reader.metadata()?.permissions();
    let mut writer = OpenOptions::new().write(true).create_new(true).open(dst)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.set_permissions(permissions)?;
    Ok(copied)
}

/// Whether an IO error is the "source and destination are on different
/// devices" condition returned by `link(2)` and `rename(2)`.
#[must_use]
pub fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EXDEV)
    }

    #[cfg(windows)]
    {
        err.raw_os_error() == Some(ERROR_NOT_SAME_DEVICE)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}

/// Build the error `link(2)` reports for a cross-device hard link.
#[must_use]
pub fn cross_device_error() -> io::Error {
    #[cfg(unix)]
    {
        io::Error::from_raw_os_error(libc::EXDEV)
    }

    #[cfg(windows)]
    {
        io::Error::from_raw_os_error(ERROR_NOT_SAME_DEVICE)
    }

    #[cfg(not(any(unix, windows)))]
    {
        io::Error::new(io::ErrorKind::Other, "cross-device link")
    }
}
