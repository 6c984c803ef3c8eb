//! The sectioned mark file on disk.

use std::{
    borrow::Cow,
    io::Write,
    path::{Path, PathBuf},
};

use encoding_rs::GBK;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::{config::FileEncoding, core::store::RecordStore};

use super::{PersistError, PersistResult, StoreSink};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads the mark file at `path`. A missing file is an empty store.
///
/// Valid UTF-8 is always accepted; anything else is decoded with
/// `encoding`.
pub fn load_mark_file(path: impl AsRef<Path>, encoding: FileEncoding) -> PersistResult<RecordStore> {
    let path = path.as_ref();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "mark file absent, starting empty");
            return Ok(RecordStore::new());
        }
        Err(err) => return Err(err.into()),
    };
    let text = decode(&bytes, encoding)?;
    let store = RecordStore::load(&text)?;
    info!(path = %path.display(), entries = store.len(), "loaded mark file");
    Ok(store)
}

pub fn decode(bytes: &[u8], encoding: FileEncoding) -> PersistResult<Cow<'_, str>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let utf8_err = match std::str::from_utf8(bytes) {
        Ok(text) => return Ok(Cow::Borrowed(text)),
        Err(err) => err,
    };
    match encoding {
        FileEncoding::Utf8 => Err(PersistError::Encoding {
            encoding: "UTF-8",
            reason: utf8_err.to_string(),
        }),
        FileEncoding::Gbk => {
            debug!("mark file is not UTF-8, decoding as GBK");
            GBK.decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| PersistError::Encoding {
                    encoding: GBK.name(),
                    reason: "malformed byte sequence".to_string(),
                })
        }
    }
}

/// Fails instead of writing lossy bytes.
pub fn encode(text: &str, encoding: FileEncoding) -> PersistResult<Cow<'_, [u8]>> {
    match encoding {
        FileEncoding::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
        FileEncoding::Gbk => {
            let (bytes, _, unmappable) = GBK.encode(text);
            if unmappable {
                return Err(PersistError::Encoding {
                    encoding: GBK.name(),
                    reason: "text contains characters outside GBK".to_string(),
                });
            }
            Ok(bytes)
        }
    }
}

/// Replaces the target file atomically: write a temp file in the same
/// directory, fsync, rename over the target.
#[derive(Debug, Clone)]
pub struct AtomicFileSink {
    path: PathBuf,
    encoding: FileEncoding,
}

impl AtomicFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encoding: FileEncoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: FileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> FileEncoding {
        self.encoding
    }

    pub fn load(&self) -> PersistResult<RecordStore> {
        load_mark_file(&self.path, self.encoding)
    }

    fn write_atomic(&self, bytes: &[u8]) -> PersistResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl StoreSink for AtomicFileSink {
    fn persist(&mut self, store: &RecordStore) -> PersistResult<()> {
        let text = store.serialize();
        let written = encode(&text, self.encoding).and_then(|bytes| {
            self.write_atomic(&bytes)?;
            Ok(bytes.len())
        });
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "failed to write mark file");
                return Err(err);
            }
        };
        info!(path = %self.path.display(), bytes, "persisted mark file");
        Ok(())
    }
}
