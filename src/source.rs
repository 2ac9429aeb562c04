//! Request body producers.
//!
//! A [`Source`] yields the bytes of a request body. Its [`size()`][Source::size]
//! decides the wire framing: a known size is sent with `Content-Length`,
//! an unknown one with `Transfer-Encoding: chunked`. Following a redirect
//! re-sends the body, which is what [`reset()`][Source::reset] is for.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use crate::Error;

/// A restartable producer of request body bytes.
pub trait Source: Send {
    /// Total number of bytes this source will produce, when known.
    fn size(&self) -> Option<u64>;

    /// The `Content-Type` to use when the caller did not set one.
    fn default_content_type(&self) -> Option<String> {
        None
    }

    /// Read some bytes into `buf`. Returns the amount written and whether
    /// more bytes may follow. `(n, false)` signals the final bytes.
    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)>;

    /// Rewind to produce the same byte sequence again.
    ///
    /// Sources backed by a stream that cannot be rewound fail here once
    /// any bytes have been consumed.
    fn reset(&mut self) -> Result<(), Error>;
}

/// The empty body.
pub struct Empty;

impl Source for Empty {
    fn size(&self) -> Option<u64> {
        Some(0)
    }

    fn read_some(&mut self, _buf: &mut [u8]) -> io::Result<(usize, bool)> {
        Ok((0, false))
    }

    fn reset(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// A body from an in-memory byte buffer.
pub struct Buffer {
    data: Vec<u8>,
    pos: usize,
    content_type: Option<String>,
}

impl Buffer {
    /// A body producing exactly `data`.
    pub fn new(data: impl Into<Vec<u8>>) -> Buffer {
        Buffer {
            data: data.into(),
            pos: 0,
            content_type: None,
        }
    }

    /// Set the content type announced by this body.
    pub fn content_type(mut self, value: impl Into<String>) -> Buffer {
        self.content_type = Some(value.into());
        self
    }
}

impl Source for Buffer {
    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn default_content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        let n = (self.data.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok((n, self.pos < self.data.len()))
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.pos = 0;
        Ok(())
    }
}

/// An `application/x-www-form-urlencoded` body from key/value pairs.
pub struct Form {
    inner: Buffer,
}

impl Form {
    /// Encode the given pairs.
    pub fn new<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Form {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k.as_ref(), v.as_ref());
        }
        Form {
            inner: Buffer::new(serializer.finish().into_bytes()),
        }
    }
}

impl Source for Form {
    fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    fn default_content_type(&self) -> Option<String> {
        Some("application/x-www-form-urlencoded".to_string())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        self.inner.read_some(buf)
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.inner.reset()
    }
}

/// An `application/json` body from any serializable value.
pub struct Json {
    inner: Buffer,
}

impl Json {
    /// Serialize `value` to a JSON body.
    pub fn new(value: &impl Serialize) -> Result<Json, Error> {
        let data = serde_json::to_vec(value).map_err(|e| Error::parse(format!("json: {}", e)))?;
        Ok(Json {
            inner: Buffer::new(data),
        })
    }
}

impl Source for Json {
    fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    fn default_content_type(&self) -> Option<String> {
        Some("application/json".to_string())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        self.inner.read_some(buf)
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.inner.reset()
    }
}

/// A body read from a file. Rewindable via seek.
pub struct FileSource {
    file: File,
    len: Option<u64>,
    content_type: Option<String>,
}

impl FileSource {
    /// Open `path` and guess its content type from the extension.
    pub fn open(path: impl AsRef<Path>) -> Result<FileSource, Error> {
        let path = path.as_ref();
        let content_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.to_string());
        let file = File::open(path)?;
        let len = file.metadata().ok().map(|m| m.len());
        Ok(FileSource {
            file,
            len,
            content_type,
        })
    }

    /// Use an already opened file.
    pub fn from_file(file: File) -> FileSource {
        let len = file.metadata().ok().map(|m| m.len());
        FileSource {
            file,
            len,
            content_type: None,
        }
    }
}

impl Source for FileSource {
    fn size(&self) -> Option<u64> {
        self.len
    }

    fn default_content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        let n = self.file.read(buf)?;
        Ok((n, n > 0))
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

/// A body from an arbitrary reader. Sent chunked unless a size is given,
/// and not rewindable once bytes have been consumed.
pub struct ReaderSource {
    reader: Box<dyn Read + Send>,
    size: Option<u64>,
    consumed: bool,
}

impl ReaderSource {
    /// Body from a reader of unknown length (sent chunked).
    pub fn new(reader: impl Read + Send + 'static) -> ReaderSource {
        ReaderSource {
            reader: Box::new(reader),
            size: None,
            consumed: false,
        }
    }

    /// Body from a reader with a known length.
    pub fn sized(reader: impl Read + Send + 'static, size: u64) -> ReaderSource {
        ReaderSource {
            reader: Box::new(reader),
            size: Some(size),
            consumed: false,
        }
    }
}

impl Source for ReaderSource {
    fn size(&self) -> Option<u64> {
        self.size
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.consumed = true;
        }
        Ok((n, n > 0))
    }

    fn reset(&mut self) -> Result<(), Error> {
        if self.consumed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "body stream cannot be rewound",
            )));
        }
        Ok(())
    }
}

mod private {
    pub trait Sealed {}
}
use private::Sealed;

/// Conversion of convenient types into a boxed [`Source`].
pub trait IntoSource: Sealed {
    /// Turn `self` into a body producer.
    fn into_source(self) -> Box<dyn Source>;
}

macro_rules! impl_into_source_bytes {
    ($t:ty) => {
        impl Sealed for $t {}
        impl IntoSource for $t {
            fn into_source(self) -> Box<dyn Source> {
                Box::new(Buffer::new(self.as_bytes().to_vec()))
            }
        }
    };
}

impl_into_source_bytes!(&str);
impl_into_source_bytes!(String);
impl_into_source_bytes!(&String);

macro_rules! impl_into_source_vec {
    ($t:ty) => {
        impl Sealed for $t {}
        impl IntoSource for $t {
            fn into_source(self) -> Box<dyn Source> {
                Box::new(Buffer::new(self.to_vec()))
            }
        }
    };
}

impl_into_source_vec!(&[u8]);
impl_into_source_vec!(&Vec<u8>);

impl Sealed for Vec<u8> {}
impl IntoSource for Vec<u8> {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(Buffer::new(self))
    }
}

impl Sealed for () {}
impl IntoSource for () {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(Empty)
    }
}

impl Sealed for File {}
impl IntoSource for File {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(FileSource::from_file(self))
    }
}

macro_rules! impl_into_source_self {
    ($t:ty) => {
        impl Sealed for $t {}
        impl IntoSource for $t {
            fn into_source(self) -> Box<dyn Source> {
                Box::new(self)
            }
        }
    };
}

impl_into_source_self!(Empty);
impl_into_source_self!(Buffer);
impl_into_source_self!(Form);
impl_into_source_self!(Json);
impl_into_source_self!(FileSource);
impl_into_source_self!(ReaderSource);

impl_into_source_self!(crate::multipart::MultipartSource);

impl Sealed for Box<dyn Source> {}
impl IntoSource for Box<dyn Source> {
    fn into_source(self) -> Box<dyn Source> {
        self
    }
}
