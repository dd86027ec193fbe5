//! SHA-256 content digests.
//!
//! Model files are addressed by the lowercase hex digest of their bytes.
//! Files are hashed with a streamed read so multi-gigabyte checkpoints never
//! have to fit in memory.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Read buffer size used when streaming a file through the hasher (1 MiB).
const HASH_BUFFER_BYTES: usize = 1024 * 1024;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute the SHA-256 hex digest of a file's contents.
///
/// Symlinks are followed, so hashing a linked workspace slot hashes the
/// store entry it points at.
pub fn sha256_file(path: &Path) -> Result<String, CoreError> {
    let io_err = |source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_BYTES, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_BYTES];

    loop {
        let n = reader.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare two hex digests ignoring case.
///
/// Snapshots written by other tools sometimes carry upper-case digests.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn consistent_output() {
        let data = b"hello world";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_eq!(sha256_hex(data).len(), 64);
    }

    #[test]
    fn file_digest_matches_in_memory_digest() {
        let mut f = tempfile::NamedTempFile::new().expect("create temp file");
        f.write_all(b"model weights").expect("write");
        let from_file = sha256_file(f.path()).expect("hash file");
        assert_eq!(from_file, sha256_hex(b"model weights"));
    }

    #[test]
    fn file_digest_of_missing_file_is_io_error() {
        let err = sha256_file(Path::new("/definitely/not/here.bin")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[test]
    fn digests_compare_case_insensitively() {
        assert!(digests_match("ABCDEF", "abcdef"));
        assert!(!digests_match("abc", "abd"));
    }
}
