use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{InstallState, State, StateId};
use crate::agent::AgentContext;
use crate::client::ClientError;
use crate::descriptor::UpdateDescriptor;
use crate::event::cancellation::Cancellation;

const PARTIAL_EXTENSION: &str = "part";

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("could not access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Fetches the payload into `download_dir/<sha256sum>` and verifies its checksum.
#[derive(Debug)]
pub struct DownloadState {
    cancellation: Cancellation,
    descriptor: UpdateDescriptor,
}

impl DownloadState {
    pub fn new(descriptor: UpdateDescriptor) -> Self {
        Self {
            cancellation: Cancellation::new(),
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &UpdateDescriptor {
        &self.descriptor
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn handle(self, context: &mut AgentContext) -> State {
        context.report(StateId::Download, None);

        match download(context, &self.descriptor) {
            Ok(path) => {
                info!(path = %path.display(), "payload downloaded");
                State::Install(InstallState::new(self.descriptor))
            }
            Err(err) => {
                warn!(%err, "download failed");
                State::error(err)
            }
        }
    }
}

fn download(
    context: &AgentContext,
    descriptor: &UpdateDescriptor,
) -> Result<PathBuf, DownloadError> {
    let download_dir = &context.download_dir;
    fs::create_dir_all(download_dir).map_err(|source| DownloadError::Io {
        path: download_dir.clone(),
        source,
    })?;

    let expected = descriptor.sha256sum().as_str();
    let path = descriptor.payload_path(download_dir);
    if path.is_file() && sha256_of_file(&path).map_err(io_error(&path))? == expected {
        debug!(path = %path.display(), "payload already downloaded");
        return Ok(path);
    }

    // the payload only shows up under its checksum name once verified
    let partial = path.with_extension(PARTIAL_EXTENSION);
    let fetched = fetch(context, descriptor, &partial).and_then(|actual| {
        if actual == expected {
            Ok(())
        } else {
            Err(DownloadError::ChecksumMismatch {
                path: path.clone(),
                expected: expected.to_string(),
                actual,
            })
        }
    });
    if let Err(err) = fetched {
        match fs::remove_file(&partial) {
            Err(remove_err) if remove_err.kind() != io::ErrorKind::NotFound => warn!(
                path = %partial.display(),
                %remove_err,
                "could not remove partial payload"
            ),
            _ => {}
        }
        return Err(err);
    }

    fs::rename(&partial, &path).map_err(io_error(&path))?;
    Ok(path)
}

// Streams the object into `partial` and returns the hex digest of what was written.
fn fetch(
    context: &AgentContext,
    descriptor: &UpdateDescriptor,
    partial: &Path,
) -> Result<String, DownloadError> {
    let file = File::create(partial).map_err(io_error(partial))?;
    let mut writer = HashingWriter::new(BufWriter::new(file));
    context.server.fetch_object(descriptor, &mut writer)?;
    writer.finish().map_err(io_error(partial))
}

fn io_error(path: &Path) -> impl Fn(io::Error) -> DownloadError + '_ {
    move |source| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn sha256_of_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Writer hashing every byte on its way to the inner writer.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Flushes the inner writer and returns the hex encoded digest.
    fn finish(mut self) -> io::Result<String> {
        self.inner.flush()?;
        Ok(hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::test_context_with;
    use crate::client::tests::MockUpdateServer;
    use crate::descriptor::tests::sha256sum_of;
    use assert_matches::assert_matches;

    const PAYLOAD: &[u8] = b"firmware payload";

    fn partial_path(context: &AgentContext, descriptor: &UpdateDescriptor) -> PathBuf {
        descriptor
            .payload_path(&context.download_dir)
            .with_extension(PARTIAL_EXTENSION)
    }

    fn serving(payload: &'static [u8]) -> MockUpdateServer {
        let mut server = MockUpdateServer::new();
        server.should_report_any();
        server
            .expect_fetch_object()
            .once()
            .returning(move |_, dest| {
                dest.write_all(payload)?;
                Ok(payload.len() as u64)
            });
        server
    }

    #[test]
    fn verified_payload_goes_to_install() {
        let descriptor = UpdateDescriptor::new("raw", sha256sum_of(PAYLOAD));
        let (mut context, _dir) = test_context_with(0, serving(PAYLOAD));

        let next = DownloadState::new(descriptor.clone()).handle(&mut context);

        assert_matches!(next, State::Install(install) => {
            assert_eq!(&descriptor, install.descriptor());
        });
        let staged = descriptor.payload_path(&context.download_dir);
        assert_eq!(PAYLOAD.to_vec(), fs::read(staged).unwrap());
    }

    #[test]
    fn download_dir_is_created() {
        let descriptor = UpdateDescriptor::new("raw", sha256sum_of(PAYLOAD));
        let (mut context, _dir) = test_context_with(0, serving(PAYLOAD));
        context.download_dir = context.download_dir.join("nested").join("dir");

        let next = DownloadState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Install(_));
        assert!(context.download_dir.is_dir());
    }

    #[test]
    fn checksum_mismatch_removes_payload() {
        let descriptor = UpdateDescriptor::new("raw", sha256sum_of(b"something else"));
        let (mut context, _dir) = test_context_with(0, serving(PAYLOAD));

        let next = DownloadState::new(descriptor.clone()).handle(&mut context);

        assert_matches!(next, State::Error(error) => {
            assert!(error.message().starts_with("checksum mismatch"));
        });
        assert!(!descriptor.payload_path(&context.download_dir).exists());
        assert!(!partial_path(&context, &descriptor).exists());
    }

    #[test]
    fn already_downloaded_payload_is_not_fetched_again() {
        let descriptor = UpdateDescriptor::new("raw", sha256sum_of(PAYLOAD));
        let mut server = MockUpdateServer::new();
        server.should_report_any();
        server.expect_fetch_object().never();
        let (mut context, _dir) = test_context_with(0, server);
        fs::write(descriptor.payload_path(&context.download_dir), PAYLOAD).unwrap();

        let next = DownloadState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Install(_));
    }

    #[test]
    fn stale_payload_is_replaced() {
        let descriptor = UpdateDescriptor::new("raw", sha256sum_of(PAYLOAD));
        let (mut context, _dir) = test_context_with(0, serving(PAYLOAD));
        let staged = descriptor.payload_path(&context.download_dir);
        fs::write(&staged, b"truncated transfer").unwrap();

        let next = DownloadState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Install(_));
        assert_eq!(PAYLOAD.to_vec(), fs::read(staged).unwrap());
    }

    #[test]
    fn interrupted_fetch_leaves_nothing_behind() {
        let descriptor = UpdateDescriptor::new("raw", sha256sum_of(PAYLOAD));
        let mut server = MockUpdateServer::new();
        server.should_report_any();
        server.expect_fetch_object().once().returning(|descriptor, dest| {
            dest.write_all(&PAYLOAD[..8])?;
            Err(ClientError::Request {
                url: format!("http://localhost:8080/objects/{}", descriptor.sha256sum()),
                reason: "connection reset by peer".to_string(),
            })
        });
        let (mut context, _dir) = test_context_with(0, server);

        let next = DownloadState::new(descriptor.clone()).handle(&mut context);

        assert_matches!(next, State::Error(error) => {
            assert!(error.message().contains("connection reset by peer"));
        });
        assert!(!descriptor.payload_path(&context.download_dir).exists());
        assert!(!partial_path(&context, &descriptor).exists());
    }

    #[test]
    fn verified_payload_replaces_partial_file() {
        let descriptor = UpdateDescriptor::new("raw", sha256sum_of(PAYLOAD));
        let (mut context, _dir) = test_context_with(0, serving(PAYLOAD));
        fs::write(partial_path(&context, &descriptor), b"left over").unwrap();

        let next = DownloadState::new(descriptor.clone()).handle(&mut context);

        assert_matches!(next, State::Install(_));
        assert!(!partial_path(&context, &descriptor).exists());
        assert_eq!(
            PAYLOAD.to_vec(),
            fs::read(descriptor.payload_path(&context.download_dir)).unwrap()
        );
    }

    #[test]
    fn hashing_writer_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"firmware ").unwrap();
        writer.write_all(b"payload").unwrap();

        assert_eq!(sha256sum_of(PAYLOAD).as_str(), writer.finish().unwrap());
    }
}
