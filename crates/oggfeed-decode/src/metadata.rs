//! Header-only stream inspection.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use oggfeed_core::{DecodeConfig, DecodeError, Error, Result, Seconds, StreamInfo};
use tracing::{debug, trace};

use crate::feed::ReaderSource;
use crate::header::{acquire_headers, Identification};
use crate::ogg::{PageFetch, PageReader};

/// Read the parameters of the first logical stream, plus the total play time
/// of every chained stream.
pub fn read_stream_info<R: Read + Seek>(reader: &mut R) -> Result<StreamInfo> {
    let chunk_size = DecodeConfig::default().read_chunk_size;

    reader.seek(SeekFrom::Start(0))?;
    let mut pages = PageReader::new(ReaderSource::new(&mut *reader), chunk_size);
    let first = match pages.next_page() {
        PageFetch::Page(page) => page,
        PageFetch::Corrupt | PageFetch::Exhausted => {
            return Err(Error::Decode(DecodeError::InvalidOggBitstream));
        }
    };
    let (_, headers) = acquire_headers(&mut pages, &first)?;
    drop(pages);

    reader.seek(SeekFrom::Start(0))?;
    let duration = total_duration(reader, chunk_size);
    Ok(headers.info().with_duration(duration))
}

/// [`read_stream_info`] for a file on disk.
pub fn read_file_info(path: impl AsRef<Path>) -> Result<StreamInfo> {
    let path = path.as_ref();
    debug!("Reading stream info from {}", path.display());
    let mut reader = BufReader::new(File::open(path)?);
    read_stream_info(&mut reader)
}

struct Link {
    serial: u32,
    sample_rate: u32,
    last_granule: i64,
}

/// Sum of `last_granule / sample_rate` over every Vorbis stream in the input.
fn total_duration<R: Read>(reader: R, chunk_size: usize) -> Option<Seconds> {
    let mut pages = PageReader::new(ReaderSource::new(reader), chunk_size);
    let mut links: Vec<Link> = Vec::new();

    loop {
        let page = match pages.next_page() {
            PageFetch::Page(page) => page,
            PageFetch::Corrupt => continue,
            PageFetch::Exhausted => break,
        };

        if page.is_bos() {
            let ident = page
                .fragments()
                .next()
                .and_then(|f| Identification::parse(&f.data).ok());
            if let Some(ident) = ident {
                trace!("Link {} starts: serial {:#x}", links.len(), page.serial());
                links.push(Link {
                    serial: page.serial(),
                    sample_rate: ident.sample_rate,
                    last_granule: 0,
                });
            }
            continue;
        }

        if let Some(link) = links.iter_mut().rev().find(|l| l.serial == page.serial()) {
            if page.granule_position() >= 0 {
                link.last_granule = page.granule_position();
            }
        }
    }

    if links.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let seconds: f64 = links
        .iter()
        .map(|l| l.last_granule as f64 / f64::from(l.sample_rate))
        .sum();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = seconds as u64;
    Some(Seconds(whole))
}
