//! ZIP container for `epub-builder` with reproducible output.
//!
//! Works like `epub_builder::ZipLibrary`, but every entry carries the same
//! fixed timestamp (1980-01-01, the earliest date ZIP can store), so equal
//! content always gives equal archive bytes.

use std::io::{self, Cursor, Read, Write};
use std::mem;
use std::path::Path;

use eyre::WrapErr;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const MIMETYPE: &[u8] = b"application/epub+zip";

fn options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
}

pub struct StableZip {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl StableZip {
    /// Start an archive with the uncompressed `mimetype` entry in first place.
    pub fn new() -> eyre::Result<Self> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.set_comment("");
        writer
            .start_file("mimetype", options(CompressionMethod::Stored))
            .wrap_err("could not create mimetype in epub")?;
        writer
            .write_all(MIMETYPE)
            .wrap_err("could not write mimetype in epub")?;
        Ok(Self { writer })
    }
}

impl epub_builder::Zip for StableZip {
    fn write_file<P: AsRef<Path>, R: Read>(&mut self, path: P, mut content: R) -> eyre::Result<()> {
        // ZIP entry names always use forward slashes.
        let name = path.as_ref().to_string_lossy().replace('\\', "/");
        self.writer
            .start_file(name.as_str(), options(CompressionMethod::Deflated))
            .wrap_err_with(|| format!("could not create file '{}' in epub", name))?;
        io::copy(&mut content, &mut self.writer)
            .wrap_err_with(|| format!("could not write file '{}' in epub", name))?;
        Ok(())
    }

    fn generate<W: Write>(&mut self, mut to: W) -> eyre::Result<()> {
        let writer = mem::replace(&mut self.writer, ZipWriter::new(Cursor::new(Vec::new())));
        let bytes = writer
            .finish()
            .wrap_err("error writing zip file")?
            .into_inner();
        to.write_all(&bytes).wrap_err("error writing zip file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epub_builder::Zip;

    fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = StableZip::new().unwrap();
        for (name, data) in files {
            zip.write_file(name, *data).unwrap();
        }
        let mut out = Vec::new();
        zip.generate(&mut out).unwrap();
        out
    }

    #[test]
    fn mimetype_comes_first_and_uncompressed() {
        let bytes = archive(&[("OEBPS/a.xhtml", &b"<p/>"[..])]);
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        drop(first);
        assert_eq!(zip.by_index(1).unwrap().name(), "OEBPS/a.xhtml");
    }

    #[test]
    fn same_files_give_same_bytes() {
        let files: &[(&str, &[u8])] = &[
            ("OEBPS/a.xhtml", &b"<p>eins</p>"[..]),
            ("OEBPS/b.css", &b"p {}"[..]),
        ];
        let first = archive(files);
        std::thread::sleep(std::time::Duration::from_millis(2100));
        assert_eq!(first, archive(files));
    }

    #[test]
    fn entries_carry_the_fixed_timestamp() {
        let bytes = archive(&[("OEBPS/a.xhtml", &b"<p/>"[..])]);
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let entry = zip.by_index(1).unwrap();
        assert_eq!(entry.last_modified(), Some(DateTime::default()));
    }
}
