//! Compressed output sinks
//!
//! The dump is written in one forward pass. A sink wraps the destination
//! (a file or stdout) with an optional streaming compressor. Closing the sink
//! finishes the compressor first and then flushes the destination.

use crate::Result;
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Output compression method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    #[default]
    #[serde(alias = "None")]
    None,
    #[serde(alias = "Gzip", alias = "gz")]
    Gzip,
    #[serde(alias = "Bzip2", alias = "bz2")]
    Bzip2,
}

impl CompressionMethod {
    /// Conventional file name suffix for this method
    pub fn extension_suffix(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
            Self::Bzip2 => write!(f, "bzip2"),
        }
    }
}

type Destination = BufWriter<Box<dyn Write + Send>>;

/// Append-only dump destination
pub enum DumpSink {
    Plain(Destination),
    Gzip(GzEncoder<Destination>),
    Bzip2(BzEncoder<Destination>),
}

impl DumpSink {
    /// Open a sink at `path`, or on stdout when no path is given
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] when the file cannot be created.
    pub fn open(method: CompressionMethod, path: Option<&Path>) -> Result<Self> {
        let destination: Box<dyn Write + Send> = match path {
            Some(path) => {
                let file = File::create(path).map_err(|error| {
                    io::Error::new(
                        error.kind(),
                        format!("cannot open {} for writing: {}", path.display(), error),
                    )
                })?;
                Box::new(file)
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self::from_writer(method, destination))
    }

    /// Wrap an arbitrary writer
    pub fn from_writer(method: CompressionMethod, writer: Box<dyn Write + Send>) -> Self {
        let destination = BufWriter::new(writer);
        match method {
            CompressionMethod::None => DumpSink::Plain(destination),
            CompressionMethod::Gzip => {
                DumpSink::Gzip(GzEncoder::new(destination, flate2::Compression::default()))
            }
            CompressionMethod::Bzip2 => {
                DumpSink::Bzip2(BzEncoder::new(destination, bzip2::Compression::default()))
            }
        }
    }

    /// Append a chunk of dump text
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Finish the compressor and flush the destination
    pub fn close(self) -> Result<()> {
        let mut destination = match self {
            DumpSink::Plain(destination) => destination,
            DumpSink::Gzip(encoder) => encoder.finish()?,
            DumpSink::Bzip2(encoder) => encoder.finish()?,
        };
        destination.flush()?;
        Ok(())
    }
}

impl Write for DumpSink {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        match self {
            DumpSink::Plain(destination) => destination.write(buffer),
            DumpSink::Gzip(encoder) => encoder.write(buffer),
            DumpSink::Bzip2(encoder) => encoder.write(buffer),
        }
    }

    /// Pushes buffered bytes through to the destination; the dump code never
    /// calls this before [`DumpSink::close`].
    fn flush(&mut self) -> io::Result<()> {
        match self {
            DumpSink::Plain(destination) => destination.flush(),
            DumpSink::Gzip(encoder) => encoder.flush(),
            DumpSink::Bzip2(encoder) => encoder.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::read::BzDecoder;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    const CONTENT: &str = "-- header\nINSERT INTO `t` VALUES (1,'x'),(2,'y');\n-- footer\n";

    fn write_through(method: CompressionMethod, path: &Path) -> Vec<u8> {
        let mut sink = DumpSink::open(method, Some(path)).unwrap();
        for line in CONTENT.split_inclusive('\n') {
            sink.write_str(line).unwrap();
        }
        sink.close().unwrap();
        std::fs::read(path).unwrap()
    }

    #[test]
    fn test_plain_sink_passes_bytes_through() {
        let dir = tempdir().unwrap();
        let bytes = write_through(CompressionMethod::None, &dir.path().join("plain.sql"));
        assert_eq!(bytes, CONTENT.as_bytes());
    }

    #[test]
    fn test_gzip_round_trip_matches_plain() {
        let dir = tempdir().unwrap();
        let plain = write_through(CompressionMethod::None, &dir.path().join("plain.sql"));
        let compressed = write_through(CompressionMethod::Gzip, &dir.path().join("dump.sql.gz"));
        assert_ne!(compressed, plain);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, plain);
    }

    #[test]
    fn test_bzip2_round_trip_matches_plain() {
        let dir = tempdir().unwrap();
        let plain = write_through(CompressionMethod::None, &dir.path().join("plain.sql"));
        let compressed = write_through(CompressionMethod::Bzip2, &dir.path().join("dump.sql.bz2"));
        assert!(compressed.starts_with(b"BZh"));

        let mut decoded = Vec::new();
        BzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, plain);
    }

    #[test]
    fn test_open_unwritable_path_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("dump.sql");
        let error = DumpSink::open(CompressionMethod::None, Some(&path)).err().unwrap();
        assert!(matches!(error, crate::Error::Io(_)));
        assert!(error.to_string().contains("missing"));
    }

    #[test]
    fn test_extension_suffix() {
        assert_eq!(CompressionMethod::None.extension_suffix(), "");
        assert_eq!(CompressionMethod::Gzip.extension_suffix(), ".gz");
        assert_eq!(CompressionMethod::Bzip2.extension_suffix(), ".bz2");
    }
}
