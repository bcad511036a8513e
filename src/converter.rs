use std::{
    ffi::OsString,
    fs::File,
    io::{self, BufWriter, Read, Seek, Write},
    path::{Path, PathBuf},
};

use binrw::{io::BufReader, BinReaderExt};
use log::debug;
use thiserror::Error;

use crate::structs::{DatField, DatHeader, Gap, LeWord};

/// appended to the input path to get the output path
pub const OUTPUT_SUFFIX: &str = ".new.txt";

/// written after every counter value
#[cfg(not(feature = "lf"))]
pub const TERMINATOR: &[u8] = b"\r\n";
#[cfg(feature = "lf")]
pub const TERMINATOR: &[u8] = b"\n";

/// longest output path that is attempted, in bytes
#[cfg(windows)]
pub const MAX_PATH_LEN: usize = 260;
#[cfg(not(windows))]
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Error, Debug)]
#[error("error reading {field}")]
pub struct DecodeError {
    pub field: DatField,
    #[source]
    pub source: binrw::Error,
}

#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("error writing counter value")]
    Write(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("{}: path too long", .path.display())]
    PathTooLong { path: PathBuf },
    #[error("open: {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read: {}: error reading {field}", .path.display())]
    ShortRead {
        path: PathBuf,
        field: DatField,
        #[source]
        source: binrw::Error,
    },
    #[error("write: {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConvertError {
    fn short_read(path: &Path, err: DecodeError) -> Self {
        Self::ShortRead {
            path: path.to_path_buf(),
            field: err.field,
            source: err.source,
        }
    }
}

/// `<path>.new.txt`, unless that would exceed [`MAX_PATH_LEN`]
pub fn output_path_for(path: &Path) -> Result<PathBuf, ConvertError> {
    let len = path.as_os_str().len() + OUTPUT_SUFFIX.len();
    if len > MAX_PATH_LEN {
        return Err(ConvertError::PathTooLong {
            path: path.to_path_buf(),
        });
    }
    let mut out = OsString::with_capacity(len);
    out.push(path.as_os_str());
    out.push(OUTPUT_SUFFIX);
    Ok(PathBuf::from(out))
}

fn read_word<R: Read + Seek>(reader: &mut R, field: DatField) -> Result<u32, DecodeError> {
    let word: LeWord = reader
        .read_le()
        .map_err(|source| DecodeError { field, source })?;
    Ok(word.0)
}

/// reads the channel count, skips the gap and reads the live time
pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<DatHeader, DecodeError> {
    let channel_count = read_word(reader, DatField::ChannelCount)?;
    reader
        .read_le::<Gap>()
        .map_err(|source| DecodeError {
            field: DatField::Gap,
            source,
        })?;
    let live_time = read_word(reader, DatField::LiveTime)?;
    Ok(DatHeader {
        channel_count,
        live_time,
    })
}

/// Copies `count` counters from the reader to the writer, one decimal value
/// followed by `terminator` each. Returns how many were written.
///
/// Nothing past the last counter is read. On error, everything before the
/// failing counter has already been handed to the writer.
pub fn transcribe_counters<R: Read + Seek, W: Write>(
    reader: &mut R,
    writer: &mut W,
    count: u32,
    terminator: &[u8],
) -> Result<u32, TranscribeError> {
    for written in 0..count {
        let value = match read_word(reader, DatField::Counter) {
            Ok(value) => value,
            Err(e) => {
                debug!("counter {written} of {count} missing");
                return Err(e.into());
            }
        };
        write!(writer, "{value}")?;
        writer.write_all(terminator)?;
    }
    Ok(count)
}

/// A single file being converted. Holds both handles, which are closed when
/// this is dropped, the output first.
pub struct Conversion {
    output: BufWriter<File>,
    input: BufReader<File>,
    input_path: PathBuf,
    output_path: PathBuf,
    header: DatHeader,
}

impl Conversion {
    /// opens the input, creates the output and reads the header
    pub fn begin<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        let input_path = path.as_ref().to_path_buf();
        let output_path = output_path_for(&input_path)?;
        let mut input =
            BufReader::new(File::open(&input_path).map_err(|source| ConvertError::Open {
                path: input_path.clone(),
                source,
            })?);
        let output =
            BufWriter::new(File::create(&output_path).map_err(|source| ConvertError::Open {
                path: output_path.clone(),
                source,
            })?);
        debug!("created {}", output_path.display());
        let header =
            read_header(&mut input).map_err(|e| ConvertError::short_read(&input_path, e))?;
        Ok(Conversion {
            output,
            input,
            input_path,
            output_path,
            header,
        })
    }

    pub fn header(&self) -> &DatHeader {
        &self.header
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// writes all counters, a partial output stays on disk if this fails
    pub fn finish(mut self, terminator: &[u8]) -> Result<u32, ConvertError> {
        let written = transcribe_counters(
            &mut self.input,
            &mut self.output,
            self.header.channel_count,
            terminator,
        )
        .map_err(|e| match e {
            TranscribeError::Decode(e) => ConvertError::short_read(&self.input_path, e),
            TranscribeError::Write(source) => ConvertError::Write {
                path: self.output_path.clone(),
                source,
            },
        })?;
        self.output.flush().map_err(|source| ConvertError::Write {
            path: self.output_path.clone(),
            source,
        })?;
        debug!(
            "wrote {written} counters to {}, {} bytes read",
            self.output_path().display(),
            self.header.record_len()
        );
        Ok(written)
    }
}

/// Converts `path` to `<path>.new.txt` using [`TERMINATOR`].
///
/// `on_header` is called once the header is read, before any counter is.
pub fn convert_file<P, F>(path: P, on_header: F) -> Result<u32, ConvertError>
where
    P: AsRef<Path>,
    F: FnOnce(&Path, &DatHeader),
{
    let conversion = Conversion::begin(path)?;
    on_header(conversion.input_path(), conversion.header());
    conversion.finish(TERMINATOR)
}
