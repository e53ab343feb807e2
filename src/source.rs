//! Facilities for validating and reading the text file being counted.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::{Result, WcError};

/// A regular file validated as a count source, with its size captured up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    size: u64,
}

impl SourceFile {
    /// Validates that `path` names an existing regular file and records its size.
    ///
    /// Missing paths and non-files (directories, sockets, ...) are reported as
    /// [`WcError::SourceNotFound`]; other metadata failures surface as IO errors.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = match path.metadata() {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(WcError::SourceNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(err) => return Err(WcError::io(err, Some(path.to_path_buf()))),
        };
        if !metadata.is_file() {
            return Err(WcError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Path of the source file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes observed when the source was opened.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Opens an independent read handle.
    pub fn handle(&self) -> Result<File> {
        File::open(&self.path).map_err(|err| self.io_error(err))
    }

    /// Reads at most `limit` leading bytes.
    ///
    /// The returned flag is `true` when the sample holds the entire file.
    pub fn read_sample(&self, limit: usize) -> Result<(Vec<u8>, bool)> {
        let mut buffer = Vec::with_capacity(limit.min(self.size as usize));
        self.handle()?
            .take(limit as u64)
            .read_to_end(&mut buffer)
            .map_err(|err| self.io_error(err))?;
        let complete = (buffer.len() as u64) >= self.size;
        Ok((buffer, complete))
    }

    /// Reads the entire file in one operation.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|err| self.io_error(err))
    }

    pub(crate) fn io_error(&self, err: std::io::Error) -> WcError {
        WcError::io(err, Some(self.path.clone()))
    }
}
