use std::{
    fs,
    path::Path,
    time::{Duration, SystemTime},
};

use crate::error::{FileSystemError, FileSystemResult};

/// Removes the specified file or directory.
///
/// Missing paths are not an error. Directories are removed recursively.
///
/// # Errors
///
/// Returns [`FileSystemError::Remove`] if the removal fails for any reason other than the path
/// not existing.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| {
        FileSystemError::Remove {
            path: path.to_path_buf(),
            source: err,
        }
    })
}

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::CreateDir`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::CreateDir {
                path: path.to_path_buf(),
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Deletes regular files directly inside `dir` whose modification time is older than `max_age`.
///
/// Returns the number of files removed. A missing directory removes nothing. Files whose
/// metadata cannot be read are left alone.
///
/// # Errors
///
/// * [`FileSystemError::ReadDir`] if the directory exists but cannot be read.
/// * [`FileSystemError::Remove`] if a stale file cannot be removed.
pub fn remove_stale_files<P: AsRef<Path>>(dir: P, max_age: Duration) -> FileSystemResult<usize> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(0);
    }

    let entries = fs::read_dir(dir).map_err(|err| {
        FileSystemError::ReadDir {
            path: dir.to_path_buf(),
            source: err,
        }
    })?;

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };

        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age {
            fs::remove_file(&path).map_err(|err| {
                FileSystemError::Remove {
                    path: path.clone(),
                    source: err,
                }
            })?;
            tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "removed stale file");
            removed += 1;
        }
    }

    Ok(removed)
}

/// Turns an arbitrary identifier into a string that is safe to use as a single file name.
///
/// ASCII alphanumerics, `.`, `-` and `_` are kept; everything else becomes `_`. Leading dots
/// are replaced so the result can never be `.` or `..` or a hidden file.
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.starts_with('.') {
        sanitized.replace_range(..1, "_");
    }
    if sanitized.is_empty() {
        sanitized.push('_');
    }
    sanitized
}
