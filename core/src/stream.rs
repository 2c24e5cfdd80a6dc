use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use pbr::{ProgressBar, Units};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Stdout};
use std::path::Path;
use std::time::Duration;

/// Read-ahead buffer placed in front of the decompressor. Dump files are
/// tens of gigabytes; a large buffer keeps the downstream parsers fed.
pub const READ_BUFFER_BYTES: usize = 100 * 1024 * 1024;

const FILE_BUFFER_BYTES: usize = 8192 * 4;

/// A readable dump stream, decompressed if necessary.
pub type DumpReader = Box<dyn BufRead + Send>;

/// Compression format of a dump file, detected from its suffix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Compression {
    Gzip,
    Bzip2,
    Plain,
}

impl Compression {
    /// Detect the compression of a dump from its file suffix.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("bz2") => Compression::Bzip2,
            _ => Compression::Plain,
        }
    }
}

fn wrap<R: Read + Send + 'static>(source: R, compression: Compression) -> DumpReader {
    match compression {
        Compression::Gzip => Box::new(BufReader::with_capacity(
            READ_BUFFER_BYTES,
            GzDecoder::new(source),
        )),
        Compression::Bzip2 => Box::new(BufReader::with_capacity(
            READ_BUFFER_BYTES,
            BzDecoder::new(source),
        )),
        Compression::Plain => Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, source)),
    }
}

/// Open a dump file, autodetecting gzip/bzip2/plain by suffix.
pub fn open_dump(path: &Path) -> io::Result<DumpReader> {
    let file = File::open(path)?;
    let buf = BufReader::with_capacity(FILE_BUFFER_BYTES, file);
    Ok(wrap(buf, Compression::detect(path)))
}

/// Open a dump file with a byte progress bar over the compressed stream.
pub fn open_dump_with_progress(path: &Path) -> io::Result<DumpReader> {
    let file = File::open(path)?;
    let total = file.metadata()?.len();
    let reader = ProgressReader::new(BufReader::with_capacity(FILE_BUFFER_BYTES, file), total);
    Ok(wrap(reader, Compression::detect(path)))
}

/// Reader adapter ticking a byte progress bar as data is consumed.
pub struct ProgressReader<R> {
    inner: R,
    bar: ProgressBar<Stdout>,
    done: bool,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total: u64) -> Self {
        let mut bar = ProgressBar::new(total);
        bar.set_units(Units::Bytes);
        bar.set_max_refresh_rate(Some(Duration::from_millis(250)));
        ProgressReader {
            inner,
            bar,
            done: false,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        if read == 0 {
            if !self.done {
                self.bar.finish();
                self.done = true;
            }
        } else {
            self.bar.add(read as u64);
        }
        Ok(read)
    }
}
