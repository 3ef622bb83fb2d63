//! Leaf error types. They carry paths and IO sources; higher crates attach diagnostics.

use std::{error::Error, fmt, io, path::PathBuf};

/// An artifact could not be hashed.
#[derive(Debug)]
pub enum HashError {
    Unreadable { path: PathBuf, source: io::Error },
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let HashError::Unreadable { path, source } = self;
        write!(f, "Cannot read `{}` for hashing: {source}", path.display())
    }
}

impl Error for HashError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        let HashError::Unreadable { source, .. } = self;
        Some(source)
    }
}

/// A configured path could not be expanded.
#[derive(Debug)]
pub enum PathError {
    Empty,
    CurrentDir { source: io::Error },
    MissingEnvVar { var: String, input: String },
    UnclosedVariable { input: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => f.write_str("Path is empty"),
            PathError::CurrentDir { source } => {
                write!(f, "Cannot resolve relative path, current directory unavailable: {source}")
            }
            PathError::MissingEnvVar { var, input } => {
                write!(f, "`{input}` refers to `${var}`, which is not set")
            }
            PathError::UnclosedVariable { input } => {
                write!(f, "Missing `}}` in variable reference `{input}`")
            }
        }
    }
}

impl Error for PathError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PathError::CurrentDir { source } => Some(source),
            _ => None,
        }
    }
}

/// Cache and data directory maintenance failures.
#[derive(Debug)]
pub enum FileSystemError {
    Remove { path: PathBuf, source: io::Error },
    CreateDir { path: PathBuf, source: io::Error },
    ReadDir { path: PathBuf, source: io::Error },
    NotADirectory { path: PathBuf },
}

impl FileSystemError {
    pub fn path(&self) -> &PathBuf {
        match self {
            FileSystemError::Remove { path, .. }
            | FileSystemError::CreateDir { path, .. }
            | FileSystemError::ReadDir { path, .. }
            | FileSystemError::NotADirectory { path } => path,
        }
    }
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path().display();
        match self {
            FileSystemError::Remove { source, .. } => write!(f, "Cannot remove `{path}`: {source}"),
            FileSystemError::CreateDir { source, .. } => {
                write!(f, "Cannot create directory `{path}`: {source}")
            }
            FileSystemError::ReadDir { source, .. } => {
                write!(f, "Cannot list directory `{path}`: {source}")
            }
            FileSystemError::NotADirectory { .. } => write!(f, "`{path}` exists but is not a directory"),
        }
    }
}

impl Error for FileSystemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FileSystemError::Remove { source, .. }
            | FileSystemError::CreateDir { source, .. }
            | FileSystemError::ReadDir { source, .. } => Some(source),
            FileSystemError::NotADirectory { .. } => None,
        }
    }
}

pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;
pub type HashResult<T> = std::result::Result<T, HashError>;
pub type PathResult<T> = std::result::Result<T, PathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_error_keeps_source() {
        let error = HashError::Unreadable {
            path: PathBuf::from("/cache/org.app.apk"),
            source: io::Error::new(io::ErrorKind::NotFound, "file not found"),
        };
        assert_eq!(
            error.to_string(),
            "Cannot read `/cache/org.app.apk` for hashing: file not found"
        );
        assert!(error.source().is_some());
    }

    #[test]
    fn test_path_error_messages() {
        assert_eq!(PathError::Empty.to_string(), "Path is empty");
        let error = PathError::MissingEnvVar {
            var: "DEPOT_ROOT".into(),
            input: "$DEPOT_ROOT/db".into(),
        };
        assert_eq!(
            error.to_string(),
            "`$DEPOT_ROOT/db` refers to `$DEPOT_ROOT`, which is not set"
        );
        assert_eq!(
            PathError::UnclosedVariable {
                input: "${HOME".into()
            }
            .to_string(),
            "Missing `}` in variable reference `${HOME`"
        );
    }

    #[test]
    fn test_filesystem_error_names_path() {
        let error = FileSystemError::NotADirectory {
            path: PathBuf::from("/cache"),
        };
        assert_eq!(error.to_string(), "`/cache` exists but is not a directory");
        assert!(error.source().is_none());

        let error = FileSystemError::Remove {
            path: PathBuf::from("/cache/a.apk"),
            source: io::Error::other("busy"),
        };
        assert_eq!(error.to_string(), "Cannot remove `/cache/a.apk`: busy");
        assert_eq!(error.path(), &PathBuf::from("/cache/a.apk"));
    }
}
