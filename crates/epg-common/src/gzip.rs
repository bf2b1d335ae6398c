//! Single-layer gzip extraction into a working document file.
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tempfile::TempPath;
use tracing::debug;

use crate::error::CommonError;

const GZIP_SUFFIX: &str = ".gz";
const DOCUMENT_SUFFIX: &str = ".xml";

/// Name of the working document for a compressed source file.
///
/// `guide.xml.gz` becomes `guide.xml`; `epg_1234.gz` becomes `epg_1234.xml`.
pub fn working_file_name(source: &Path) -> String {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = base
        .strip_suffix(GZIP_SUFFIX)
        .map(str::to_string)
        .unwrap_or(base);
    if !name.to_ascii_lowercase().ends_with(DOCUMENT_SUFFIX) {
        name.push_str(DOCUMENT_SUFFIX);
    }
    name
}

/// Decompress `source` into `dest_dir`, returning the working document.
///
/// The document is removed when the returned [`TempPath`] is dropped, and on any failure
/// here. Concatenated gzip members are decoded as one stream. Failures while decoding are
/// reported as [`CommonError::Decompress`]; failures writing the output as [`CommonError::Io`].
pub fn gunzip_to_dir(source: &Path, dest_dir: &Path) -> Result<TempPath, CommonError> {
    let input = File::open(source)?;
    let target = dest_dir.join(working_file_name(source));
    let output = File::create(&target)?;
    let working = TempPath::from_path(target);

    let bytes = inflate(
        MultiGzDecoder::new(BufReader::new(input)),
        BufWriter::new(output),
    )?;
    debug!(bytes, path = %working.display(), "feed decompressed");
    Ok(working)
}

fn inflate<R: Read, W: Write>(mut decoder: R, mut output: W) -> Result<u64, CommonError> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CommonError::Decompress(e)),
        };
        output.write_all(&buf[..n])?;
        written += n as u64;
    }
    output.flush()?;
    Ok(written)
}
