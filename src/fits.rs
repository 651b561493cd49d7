//! FITS image output.
//!
//! Frames are written through cfitsio as a single primary HDU of unsigned
//! 16-bit integers. cfitsio stores them with the standard `BZERO = 32768`
//! convention. User header cards follow the structural keywords in the
//! order they were pushed.

use std::path::Path;

use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use thiserror::Error;

use crate::hardware::acquisition::CapturedFrame;

/// FITS block size in bytes; every file is a multiple of it.
pub const BLOCK_SIZE: usize = 2880;

/// Errors that can occur while writing FITS output
#[derive(Error, Debug)]
pub enum FitsError {
    /// cfitsio reported an error.
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    /// Scratch file handling failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Pixel count does not match the frame shape.
    #[error("frame has {actual} samples, expected {expected}")]
    ShapeMismatch {
        /// `rows * cols`.
        expected: usize,
        /// Samples present.
        actual: usize,
    },
    /// The blocking writer task panicked or was cancelled.
    #[error("FITS writer task failed: {0}")]
    Task(String),
}

/// A header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Quoted character string.
    Str(String),
    /// Integer.
    Int(i64),
    /// Real number.
    Float(f64),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<u32> for HeaderValue {
    fn from(value: u32) -> Self {
        HeaderValue::Int(i64::from(value))
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

/// One header record.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Keyword, at most 8 characters.
    pub keyword: String,
    /// Value.
    pub value: HeaderValue,
    /// Comment.
    pub comment: String,
}

/// Ordered list of user header cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    /// Empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a card.
    pub fn push(
        &mut self,
        keyword: &str,
        value: impl Into<HeaderValue>,
        comment: &str,
    ) -> &mut Self {
        self.cards.push(Card {
            keyword: keyword.to_ascii_uppercase(),
            value: value.into(),
            comment: comment.to_string(),
        });
        self
    }

    /// Cards in insertion order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Keywords in insertion order.
    pub fn keywords(&self) -> Vec<&str> {
        self.cards.iter().map(|c| c.keyword.as_str()).collect()
    }

    /// Value of the first card named `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| &c.value)
    }
}

/// Write `frame` with `header` to `path`, replacing any existing file.
///
/// Blocking; async callers go through [`write`].
pub fn write_file(
    path: &Path,
    frame: &CapturedFrame,
    header: &FitsHeader,
) -> Result<(), FitsError> {
    let expected = frame.rows as usize * frame.cols as usize;
    if frame.pixels.len() != expected {
        return Err(FitsError::ShapeMismatch {
            expected,
            actual: frame.pixels.len(),
        });
    }

    let description = ImageDescription {
        data_type: ImageType::UnsignedShort,
        dimensions: &[frame.rows as usize, frame.cols as usize],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    for card in header.cards() {
        let comment = card.comment.as_str();
        match &card.value {
            HeaderValue::Str(s) => hdu.write_key(&mut fptr, &card.keyword, (s.clone(), comment))?,
            HeaderValue::Int(v) => hdu.write_key(&mut fptr, &card.keyword, (*v, comment))?,
            HeaderValue::Float(v) => hdu.write_key(&mut fptr, &card.keyword, (*v, comment))?,
        }
    }

    // cfitsio applies BZERO when converting from the wider type.
    let data: Vec<i32> = frame.pixels.iter().map(|&v| i32::from(v)).collect();
    hdu.write_image(&mut fptr, &data)?;
    Ok(())
}

/// Serialize `frame` with `header` into the bytes of a complete FITS file.
pub fn encode(frame: &CapturedFrame, header: &FitsHeader) -> Result<Vec<u8>, FitsError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("frame.fits");
    write_file(&path, frame, header)?;
    Ok(std::fs::read(&path)?)
}

/// Write to `path` on the blocking pool.
pub async fn write(
    path: impl AsRef<Path>,
    frame: &CapturedFrame,
    header: &FitsHeader,
) -> Result<(), FitsError> {
    let path = path.as_ref().to_path_buf();
    let frame = frame.clone();
    let header = header.clone();
    tokio::task::spawn_blocking(move || write_file(&path, &frame, &header))
        .await
        .map_err(|e| FitsError::Task(e.to_string()))?
}

/// [`encode`] on the blocking pool.
pub async fn encode_async(
    frame: &CapturedFrame,
    header: &FitsHeader,
) -> Result<Vec<u8>, FitsError> {
    let frame = frame.clone();
    let header = header.clone();
    tokio::task::spawn_blocking(move || encode(&frame, &header))
        .await
        .map_err(|e| FitsError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::RoiRegisters;

    fn frame(rows: u32, cols: u32, pixels: Vec<u16>) -> CapturedFrame {
        CapturedFrame {
            pixels,
            rows,
            cols,
            exposure_seconds: 1.5,
            shutter_open: true,
            roi: RoiRegisters::default(),
        }
    }

    #[test]
    fn header_keeps_insertion_order() {
        let mut header = FitsHeader::new();
        header
            .push("ccdtype", "OBJECT", "CCD type")
            .push("EXPTIME", 2.0, "Exposure time (s)")
            .push("ROI_NX", 512u32, "ROI width");

        assert_eq!(header.keywords(), vec!["CCDTYPE", "EXPTIME", "ROI_NX"]);
        assert_eq!(header.get("ROI_NX"), Some(&HeaderValue::Int(512)));
        assert_eq!(header.get("MISSING"), None);
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.fits");
        let mut header = FitsHeader::new();
        header
            .push("CCDTYPE", "DARK", "CCD type")
            .push("EXPTIME", 1.5, "Exposure time (s)")
            .push("BCAMFOC", 3500i64, "BCAM focus position");
        write_file(&path, &frame(2, 3, vec![0, 1, 2, 32768, 65534, 65535]), &header).unwrap();

        let mut fptr = FitsFile::open(&path).unwrap();
        let hdu = fptr.primary_hdu().unwrap();
        assert_eq!(hdu.read_key::<i64>(&mut fptr, "BITPIX").unwrap(), 16);
        assert_eq!(hdu.read_key::<i64>(&mut fptr, "NAXIS1").unwrap(), 3);
        assert_eq!(hdu.read_key::<i64>(&mut fptr, "NAXIS2").unwrap(), 2);
        assert_eq!(hdu.read_key::<i64>(&mut fptr, "BZERO").unwrap(), 32768);
        assert_eq!(hdu.read_key::<String>(&mut fptr, "CCDTYPE").unwrap(), "DARK");
        assert_eq!(hdu.read_key::<f64>(&mut fptr, "EXPTIME").unwrap(), 1.5);
        assert_eq!(hdu.read_key::<i64>(&mut fptr, "BCAMFOC").unwrap(), 3500);

        let data: Vec<i32> = hdu.read_image(&mut fptr).unwrap();
        assert_eq!(data, vec![0, 1, 2, 32768, 65534, 65535]);
    }

    #[test]
    fn encode_pads_to_whole_blocks() {
        let bytes = encode(&frame(2, 2, vec![7, 8, 9, 10]), &FitsHeader::new()).unwrap();
        assert_eq!(bytes.len(), 2 * BLOCK_SIZE);
        assert!(bytes.starts_with(b"SIMPLE  ="));
    }

    #[test]
    fn short_frames_are_refused() {
        let err = encode(&frame(2, 2, vec![1, 2, 3]), &FitsHeader::new()).unwrap_err();
        assert!(matches!(
            err,
            FitsError::ShapeMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.fits");
        std::fs::write(&path, b"stale").unwrap();

        write(&path, &frame(1, 1, vec![7]), &FitsHeader::new())
            .await
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);
        assert!(bytes.starts_with(b"SIMPLE  ="));
    }
}
