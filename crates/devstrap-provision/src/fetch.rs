//! Release archive download.
//!
//! Bytes stream into a temp file next to the destination while being
//! hashed; the file is only renamed into place once the transfer finished
//! and the optional checksum matched. An interrupted or rejected download
//! never leaves a partial archive behind.

use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use devstrap_core::config::HttpConfig;

use crate::error::ProvisionError;

const USER_AGENT: &str = concat!("devstrap/", env!("CARGO_PKG_VERSION"));
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// A completed, verified download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

/// Seam between the pipeline and the network.
pub trait Fetch {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<Downloaded, ProvisionError>;
}

/// ureq-backed downloader with bounded retries. `file://` URLs are read
/// from disk.
pub struct Downloader {
    agent: ureq::Agent,
    retries: u32,
    backoff: Duration,
}

impl Downloader {
    pub fn new(cfg: &HttpConfig) -> Result<Self, ProvisionError> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(cfg.timeout)
            .timeout_read(cfg.timeout)
            .user_agent(USER_AGENT)
            .redirects(8);
        if let Some(ref proxy) = cfg.proxy {
            let proxy = ureq::Proxy::new(proxy).map_err(|e| ProvisionError::Download {
                url: proxy.clone(),
                reason: format!("invalid proxy: {}", e),
            })?;
            builder = builder.proxy(proxy);
        }
        Ok(Self {
            agent: builder.build(),
            retries: cfg.retries,
            backoff: INITIAL_BACKOFF,
        })
    }

    /// Override the first retry delay (doubles per attempt).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn open(&self, url: &str) -> Result<Box<dyn Read + Send + Sync>, Attempt> {
        if let Some(path) = url.strip_prefix("file://") {
            let file = std::fs::File::open(path).map_err(|e| {
                Attempt::Fatal(ProvisionError::Download {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })?;
            return Ok(Box::new(file));
        }
        match self.agent.get(url).call() {
            Ok(resp) => Ok(resp.into_reader()),
            Err(ureq::Error::Status(status, _)) => {
                let err = ProvisionError::HttpStatus {
                    url: url.to_string(),
                    status,
                };
                if is_retryable_status(status) {
                    Err(Attempt::Retry(err))
                } else {
                    Err(Attempt::Fatal(err))
                }
            }
            Err(ureq::Error::Transport(t)) => Err(Attempt::Retry(ProvisionError::Download {
                url: url.to_string(),
                reason: t.to_string(),
            })),
        }
    }

    fn attempt(&self, url: &str, dest: &Path) -> Result<(tempfile::NamedTempFile, String, u64), Attempt> {
        let dir = staging_dir(dest);
        devstrap_fs::ensure_dir(dir).map_err(|e| Attempt::Fatal(e.into()))?;
        let tmp = tempfile::Builder::new()
            .prefix(".devstrap-download-")
            .tempfile_in(dir)
            .map_err(|e| Attempt::Fatal(ProvisionError::io(dir, e)))?;

        let mut reader = self.open(url)?;
        let mut writer = HashingWriter::new(tmp.as_file());
        io::copy(&mut reader, &mut writer).map_err(|e| {
            // Mid-stream failures are network trouble, not a bad URL.
            Attempt::Retry(ProvisionError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;
        writer
            .flush()
            .map_err(|e| Attempt::Fatal(ProvisionError::io(tmp.path(), e)))?;
        let (sha256, bytes) = writer.finish();
        Ok((tmp, sha256, bytes))
    }
}

impl Fetch for Downloader {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<Downloaded, ProvisionError> {
        let mut delay = self.backoff;
        let mut attempt_no = 0u32;
        let (tmp, sha256, bytes) = loop {
            attempt_no += 1;
            match self.attempt(url, dest) {
                Ok(done) => break done,
                Err(Attempt::Retry(err)) if attempt_no <= self.retries => {
                    tracing::warn!(
                        url,
                        attempt = attempt_no,
                        retries = self.retries,
                        error = %err,
                        "download failed, retrying in {:?}",
                        delay
                    );
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                Err(Attempt::Retry(err)) | Err(Attempt::Fatal(err)) => return Err(err),
            }
        };

        if let Some(expected) = expected_sha256 {
            let expected = expected.to_ascii_lowercase();
            if expected != sha256 {
                // Dropping `tmp` deletes the rejected bytes.
                return Err(ProvisionError::ChecksumMismatch {
                    url: url.to_string(),
                    expected,
                    actual: sha256,
                });
            }
        }

        tmp.persist(dest)
            .map_err(|e| ProvisionError::io(dest, e.error))?;
        tracing::debug!(url, dest = %dest.display(), bytes, %sha256, "download complete");
        Ok(Downloaded {
            path: dest.to_path_buf(),
            sha256,
            bytes,
        })
    }
}

enum Attempt {
    Retry(ProvisionError),
    Fatal(ProvisionError),
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || status == 408 || (500..600).contains(&status)
}

fn staging_dir(dest: &Path) -> &Path {
    match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Writer adapter that hashes and counts everything passing through.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.bytes)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn downloader(retries: u32) -> Downloader {
        let cfg = HttpConfig {
            timeout: Duration::from_secs(5),
            retries,
            proxy: None,
        };
        Downloader::new(&cfg).unwrap().with_backoff(Duration::ZERO)
    }

    /// Serve canned responses, one per connection, in order.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        use std::io::{BufRead, BufReader};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        (format!("http://{}/deno.zip", addr), hits)
    }

    #[test]
    fn test_file_url_download_with_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.bin");
        std::fs::write(&src, b"abc").unwrap();
        let dest = tmp.path().join("out").join("dest.bin");

        let url = format!("file://{}", src.display());
        let done = downloader(0).fetch(&url, &dest, Some(ABC_SHA256)).unwrap();
        assert_eq!(done.bytes, 3);
        assert_eq!(done.sha256, ABC_SHA256);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
    }

    #[test]
    fn test_checksum_mismatch_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.bin");
        std::fs::write(&src, b"abc").unwrap();
        let out = tmp.path().join("out");
        let dest = out.join("dest.bin");

        let url = format!("file://{}", src.display());
        let err = downloader(0)
            .fetch(&url, &dest, Some(&"0".repeat(64)))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ChecksumMismatch { .. }));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_file_url_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("file://{}", tmp.path().join("absent").display());
        let err = downloader(3)
            .fetch(&url, &tmp.path().join("d"), None)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Download { .. }));
    }

    #[test]
    fn test_http_retries_server_errors() {
        let (url, hits) = serve(vec![(503, "busy"), (200, "abc")]);
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("deno.zip");
        let done = downloader(2).fetch(&url, &dest, Some(ABC_SHA256)).unwrap();
        assert_eq!(done.bytes, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_http_not_found_is_not_retried() {
        let (url, hits) = serve(vec![(404, "missing"), (200, "abc")]);
        let tmp = tempfile::tempdir().unwrap();
        let err = downloader(3)
            .fetch(&url, &tmp.path().join("deno.zip"), None)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::HttpStatus { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(403));
    }
}
