//! `multipart/form-data` request bodies.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::source::Source;
use crate::Error;

// quotes and backslashes would break out of the quoted filename
const FILENAME_ESCAPE: &AsciiSet = &CONTROLS.add(b'"').add(b'\\').add(b'%');

const BOUNDARY_LEN: usize = 24;

/// Builder for a multipart body.
///
/// Fields are written in insertion order. File fields are opened and
/// measured by [`prepare()`][Multipart::prepare]; until then adding a
/// missing path does not error.
#[derive(Default)]
pub struct Multipart {
    fields: Vec<Field>,
}

struct Field {
    name: String,
    data: FieldData,
}

enum FieldData {
    Text(String),
    File(PathBuf),
    Stream {
        reader: Box<dyn Read + Send>,
        filename: Option<String>,
        content_type: String,
    },
}

impl Multipart {
    /// An empty multipart body.
    pub fn new() -> Multipart {
        Multipart::default()
    }

    /// Add a text field.
    pub fn add_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Multipart {
        self.fields.push(Field {
            name: name.into(),
            data: FieldData::Text(text.into()),
        });
        self
    }

    /// Add a file field. The content type is guessed from the extension.
    pub fn add_file(mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Multipart {
        self.fields.push(Field {
            name: name.into(),
            data: FieldData::File(path.as_ref().to_path_buf()),
        });
        self
    }

    /// Add a field read from an arbitrary stream. The body will be sent
    /// chunked since the total size is unknown.
    pub fn add_stream(
        mut self,
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Multipart {
        self.fields.push(Field {
            name: name.into(),
            data: FieldData::Stream {
                reader: Box::new(reader),
                filename: filename.map(|s| s.to_string()),
                content_type: content_type.unwrap_or("application/octet-stream").to_string(),
            },
        });
        self
    }

    /// Open files, measure sizes and produce the body [`Source`].
    pub fn prepare(self) -> Result<MultipartSource, Error> {
        let boundary = random_boundary()?;
        let mut parts = Vec::with_capacity(self.fields.len());
        let mut sized = true;
        let mut size = 0u64;

        for field in self.fields {
            let part = match field.data {
                FieldData::Text(text) => {
                    let header = part_header(&boundary, &field.name, None, None);
                    Part {
                        header,
                        body: PartBody::Bytes(text.into_bytes(), 0),
                    }
                }
                FieldData::File(path) => {
                    let content_type = mime_guess::from_path(&path)
                        .first_or_octet_stream()
                        .to_string();
                    let filename = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("file")
                        .to_string();
                    let file = File::open(&path)?;
                    let len = file.metadata()?.len();
                    let header =
                        part_header(&boundary, &field.name, Some(&filename), Some(&content_type));
                    Part {
                        header,
                        body: PartBody::File { file, len },
                    }
                }
                FieldData::Stream {
                    reader,
                    filename,
                    content_type,
                } => {
                    sized = false;
                    let header = part_header(
                        &boundary,
                        &field.name,
                        filename.as_deref(),
                        Some(&content_type),
                    );
                    Part {
                        header,
                        body: PartBody::Stream {
                            reader,
                            consumed: false,
                        },
                    }
                }
            };
            size += part.header.len() as u64 + part.body_len().unwrap_or(0);
            parts.push(part);
        }

        let end = if parts.is_empty() {
            Vec::new()
        } else {
            format!("\r\n--{}--\r\n", boundary).into_bytes()
        };
        size += end.len() as u64;

        Ok(MultipartSource {
            content_type: format!("multipart/form-data; boundary={}", boundary),
            parts,
            end,
            size: if sized { Some(size) } else { None },
            index: 0,
            cursor: Cursor::Header(0),
            end_pos: 0,
        })
    }
}

impl fmt::Debug for Multipart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Multipart")
            .field("fields", &self.fields.len())
            .finish()
    }
}

// leading CRLF before every boundary; bytes before the first boundary are
// ignored by receivers
fn part_header(
    boundary: &str,
    name: &str,
    filename: Option<&str>,
    content_type: Option<&str>,
) -> Vec<u8> {
    let mut header = Vec::new();
    write!(
        header,
        "\r\n--{}\r\nContent-Disposition: form-data; name=\"{}\"",
        boundary, name
    )
    .unwrap();
    if let Some(filename) = filename {
        let escaped = utf8_percent_encode(filename, FILENAME_ESCAPE);
        write!(header, "; filename=\"{}\"", escaped).unwrap();
    }
    if let Some(content_type) = content_type {
        write!(header, "\r\nContent-Type: {}", content_type).unwrap();
    }
    header.extend_from_slice(b"\r\n\r\n");
    header
}

fn random_boundary() -> Result<String, Error> {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut bytes = [0u8; BOUNDARY_LEN];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
    Ok(bytes
        .iter()
        .map(|b| CHARSET[(*b as usize) % CHARSET.len()] as char)
        .collect())
}

struct Part {
    header: Vec<u8>,
    body: PartBody,
}

impl Part {
    fn body_len(&self) -> Option<u64> {
        match &self.body {
            PartBody::Bytes(data, _) => Some(data.len() as u64),
            PartBody::File { len, .. } => Some(*len),
            PartBody::Stream { .. } => None,
        }
    }
}

enum PartBody {
    Bytes(Vec<u8>, usize),
    File { file: File, len: u64 },
    Stream {
        reader: Box<dyn Read + Send>,
        consumed: bool,
    },
}

#[derive(Clone, Copy)]
enum Cursor {
    Header(usize),
    Body,
}

/// The prepared multipart body. Produced by [`Multipart::prepare`].
pub struct MultipartSource {
    content_type: String,
    parts: Vec<Part>,
    end: Vec<u8>,
    size: Option<u64>,
    index: usize,
    cursor: Cursor,
    end_pos: usize,
}

impl MultipartSource {
    /// The boundary-carrying content type of this body.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl Source for MultipartSource {
    fn size(&self) -> Option<u64> {
        self.size
    }

    fn default_content_type(&self) -> Option<String> {
        Some(self.content_type.clone())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        let mut total = 0;

        while total < buf.len() {
            if self.index >= self.parts.len() {
                // the end boundary
                let n = (self.end.len() - self.end_pos).min(buf.len() - total);
                buf[total..total + n].copy_from_slice(&self.end[self.end_pos..self.end_pos + n]);
                self.end_pos += n;
                total += n;
                if self.end_pos == self.end.len() {
                    return Ok((total, false));
                }
                continue;
            }

            let part = &mut self.parts[self.index];
            match self.cursor {
                Cursor::Header(pos) => {
                    let n = (part.header.len() - pos).min(buf.len() - total);
                    buf[total..total + n].copy_from_slice(&part.header[pos..pos + n]);
                    total += n;
                    if pos + n == part.header.len() {
                        self.cursor = Cursor::Body;
                    } else {
                        self.cursor = Cursor::Header(pos + n);
                    }
                }
                Cursor::Body => {
                    let n = match &mut part.body {
                        PartBody::Bytes(data, pos) => {
                            let n = (data.len() - *pos).min(buf.len() - total);
                            buf[total..total + n].copy_from_slice(&data[*pos..*pos + n]);
                            *pos += n;
                            n
                        }
                        PartBody::File { file, .. } => file.read(&mut buf[total..])?,
                        PartBody::Stream { reader, consumed } => {
                            let n = reader.read(&mut buf[total..])?;
                            if n > 0 {
                                *consumed = true;
                            }
                            n
                        }
                    };
                    total += n;
                    if n == 0 {
                        self.index += 1;
                        self.cursor = Cursor::Header(0);
                    }
                }
            }
        }

        Ok((total, true))
    }

    fn reset(&mut self) -> Result<(), Error> {
        for part in &mut self.parts {
            match &mut part.body {
                PartBody::Bytes(_, pos) => *pos = 0,
                PartBody::File { file, .. } => {
                    file.seek(SeekFrom::Start(0))?;
                }
                PartBody::Stream { consumed, .. } => {
                    if *consumed {
                        return Err(Error::Io(io::Error::new(
                            io::ErrorKind::Unsupported,
                            "multipart stream field cannot be rewound",
                        )));
                    }
                }
            }
        }
        self.index = 0;
        self.cursor = Cursor::Header(0);
        self.end_pos = 0;
        Ok(())
    }
}
