use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{StorageError, StorageResult};

const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// Both content hashes of one local file, computed in a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size: u64,
    pub md5_hex: String,
    pub sha256_hex: String,
}

impl FileDigest {
    pub async fn compute(path: &Path) -> StorageResult<Self> {
        let mut file = open_local(path).await?;
        let mut md5 = Md5::new();
        let mut sha256 = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_BYTES];
        let mut size = 0u64;

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            md5.update(&buffer[..read]);
            sha256.update(&buffer[..read]);
            size += read as u64;
        }

        Ok(Self {
            size,
            md5_hex: hex::encode(md5.finalize()),
            sha256_hex: hex::encode(sha256.finalize()),
        })
    }

    /// Value for the `Content-MD5` integrity header.
    pub fn md5_base64(&self) -> StorageResult<String> {
        md5_hex_to_base64(&self.md5_hex)
    }
}

pub async fn open_local(path: &Path) -> StorageResult<File> {
    match File::open(path).await {
        Ok(file) => Ok(file),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::FileNotFound(path.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

pub fn md5_base64(bytes: &[u8]) -> String {
    BASE64.encode(Md5::digest(bytes))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn md5_hex_to_base64(hex_digest: &str) -> StorageResult<String> {
    let raw = hex::decode(hex_digest)
        .map_err(|err| StorageError::Config(format!("invalid md5 digest: {err}")))?;
    Ok(BASE64.encode(raw))
}

/// Entity tags come back quoted from most providers.
pub fn strip_etag(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}

/// Multipart objects carry `<hash>-<part count>` instead of a content hash.
pub fn is_multipart_etag(etag: &str) -> bool {
    match strip_etag(etag).rsplit_once('-') {
        Some((hash, parts)) => {
            !hash.is_empty() && !parts.is_empty() && parts.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn hashes_known_input() {
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(md5_base64(b"hello"), "XUFAKrxLKna5cZ2REBfFkg==");
    }

    #[test]
    fn strips_quotes_from_etags() {
        assert_eq!(strip_etag("\"abc123\""), "abc123");
        assert_eq!(strip_etag("abc123"), "abc123");
    }

    #[test]
    fn recognizes_composite_multipart_etags() {
        assert!(is_multipart_etag("\"9b2cf535f27731c974343645a3985328-3\""));
        assert!(!is_multipart_etag("\"9b2cf535f27731c974343645a3985328\""));
        assert!(!is_multipart_etag("abc-"));
    }

    #[tokio::test]
    async fn digests_a_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let digest = FileDigest::compute(file.path()).await.unwrap();
        assert_eq!(digest.size, 5);
        assert_eq!(digest.md5_hex, md5_hex(b"hello"));
        assert_eq!(digest.sha256_hex, sha256_hex(b"hello"));
        assert_eq!(digest.md5_base64().unwrap(), md5_base64(b"hello"));
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_not_found() {
        let err = FileDigest::compute(Path::new("/definitely/not/here.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound(_)));
    }
}
