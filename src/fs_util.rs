use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::KiraError;

/// Opens a file for reading, transparently decompressing `*.gz`.
pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>, KiraError> {
    let file = fs::File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => KiraError::MissingInput(path.to_path_buf()),
        _ => KiraError::Filesystem(format!("open {}: {err}", path.display())),
    })?;
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(io::BufReader::new(file))))
    } else {
        Ok(Box::new(io::BufReader::new(file)))
    }
}

pub fn read_text_maybe_gz(path: &Path) -> Result<String, KiraError> {
    let mut reader = open_maybe_gz(path)?;
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|err| KiraError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(content)
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}
