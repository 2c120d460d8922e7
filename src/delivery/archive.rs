//! Compression of snapshot files before they are attached.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Gzip `path` into `<path>.gz` and remove the original.
pub fn gzip_file(path: &Path) -> io::Result<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(".gz");
    let target = PathBuf::from(target);

    let mut input = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(path)?;
    Ok(target)
}
