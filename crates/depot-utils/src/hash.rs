use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use sha2::{Digest, Sha256};

use crate::error::{HashError, HashResult};

/// Size of the chunks fed to the digest while streaming a file.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Calculates the SHA-256 checksum of a file.
///
/// The file is streamed through the hasher in [`CHUNK_SIZE`] reads, so arbitrarily large
/// artifacts never have to be held in memory. The digest is returned as lowercase hex.
///
/// # Errors
///
/// * [`HashError::Unreadable`] if the file cannot be opened or read.
///
/// # Example
///
/// ```no_run
/// use depot_utils::error::HashResult;
/// use depot_utils::hash::calculate_checksum;
///
/// fn main() -> HashResult<()> {
///     let checksum = calculate_checksum("/path/to/app.apk")?;
///     println!("sha256: {}", checksum);
///     Ok(())
/// }
/// ```
pub fn calculate_checksum<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::Unreadable {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    let file = File::open(file_path).map_err(read_failed)?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buffer).map_err(read_failed)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verifies the SHA-256 checksum of a file against an expected hex digest.
///
/// The comparison is case-insensitive. An empty `expected` value is compared like any other
/// digest and therefore never matches; callers decide whether verification is needed at all.
///
/// # Errors
///
/// * [`HashError::Unreadable`] if the file cannot be read.
pub fn verify_checksum<P: AsRef<Path>>(file_path: P, expected: &str) -> HashResult<bool> {
    let file_path = file_path.as_ref();
    let actual = calculate_checksum(file_path)?;
    let matches = actual.eq_ignore_ascii_case(expected.trim());
    if !matches {
        tracing::debug!(
            path = %file_path.display(),
            expected,
            actual,
            "checksum mismatch"
        );
    }
    Ok(matches)
}
