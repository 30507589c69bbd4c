use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use util::{VmValue, VALUE_BYTES};

/// Size of the image header: `entry`, `dataOffset`, `dataSize`,
/// `imageSize`, each one machine word wide.
pub const IMAGE_HDR_SIZE: usize = 4 * VALUE_BYTES;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The header is not self-consistent; also produced for images built
    /// with a different machine word width.
    BadHeader(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "image i/o failed: {}", err),
            Error::BadHeader(reason) => write!(f, "invalid image header: {}", reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// A compiled image: the header, the read-only TEXT region (code and
/// interned strings) and the initializer for the writable DATA region.
///
/// TEXT addresses are image-relative, so the first TEXT byte lives at
/// address [`IMAGE_HDR_SIZE`].
#[derive(Debug, PartialEq)]
pub struct Image {
    entry: VmValue,
    text: Vec<u8>,
    data: Vec<u8>,
}

impl Image {
    pub fn from(entry: VmValue, text: Vec<u8>, data: Vec<u8>) -> Image {
        Image { entry, text, data }
    }

    pub fn copy_from(entry: VmValue, text: &[u8], data: &[u8]) -> Image {
        Image {
            entry,
            text: Vec::from(text),
            data: Vec::from(data),
        }
    }

    /// TEXT address of the main program entry.
    pub fn entry(&self) -> VmValue {
        self.entry
    }

    pub fn text(&self) -> &[u8] {
        &self.text[..]
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Byte offset of the DATA initializer within the image.
    pub fn data_offset(&self) -> usize {
        IMAGE_HDR_SIZE + self.text.len()
    }

    /// Total size of the serialized image in bytes.
    pub fn image_size(&self) -> usize {
        self.data_offset() + self.data.len()
    }

    pub fn into_parts(self) -> (VmValue, Vec<u8>, Vec<u8>) {
        (self.entry, self.text, self.data)
    }
}

fn read_value_from<R: Read>(reader: &mut R) -> io::Result<VmValue> {
    let mut buf = [0u8; VALUE_BYTES];
    reader.read_exact(&mut buf)?;
    Ok(util::read_value(&buf))
}

fn write_value_to<W: Write>(writer: &mut W, value: VmValue) -> io::Result<()> {
    let mut buf = [0u8; VALUE_BYTES];
    util::write_value(&mut buf, value);
    writer.write_all(&buf)
}

pub fn read<R: Read>(reader: &mut R) -> Result<Image, Error> {
    let entry = read_value_from(reader)?;
    let data_offset = read_value_from(reader)?;
    let data_size = read_value_from(reader)?;
    let image_size = read_value_from(reader)?;

    if data_offset < IMAGE_HDR_SIZE as VmValue {
        return Err(Error::BadHeader("data offset inside header"));
    }
    if data_size < 0 {
        return Err(Error::BadHeader("negative data size"));
    }
    if i64::from(image_size) != i64::from(data_offset) + i64::from(data_size) {
        return Err(Error::BadHeader("image size does not match sections"));
    }

    let mut text = vec![0; data_offset as usize - IMAGE_HDR_SIZE];
    let mut data = vec![0; data_size as usize];
    reader.read_exact(&mut text)?;
    reader.read_exact(&mut data)?;

    Ok(Image::from(entry, text, data))
}

pub fn write<W: Write>(writer: &mut W, image: &Image) -> Result<(), Error> {
    write_value_to(writer, image.entry)?;
    write_value_to(writer, image.data_offset() as VmValue)?;
    write_value_to(writer, image.data.len() as VmValue)?;
    write_value_to(writer, image.image_size() as VmValue)?;
    writer.write_all(&image.text[..])?;
    writer.write_all(&image.data[..])?;
    Ok(())
}

pub trait ReadImageExt: Read + Sized {
    fn read_image(&mut self) -> Result<Image, Error> {
        read(self)
    }
}

impl<R: Read + Sized> ReadImageExt for R {}

pub trait WriteImageExt: Write + Sized {
    fn write_image(&mut self, image: &Image) -> Result<(), Error> {
        write(self, image)
    }
}

impl<W: Write + Sized> WriteImageExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Image, Error> {
    BufReader::new(File::open(path)?).read_image()
}

pub fn write_file<P: AsRef<Path>>(path: P, image: &Image) -> Result<(), Error> {
    BufWriter::new(File::create(path)?).write_image(image)
}

#[cfg(test)]
mod test;
