use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bvm::{Console, Host, Interpreter};

#[derive(Debug)]
pub enum IOErrorContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
pub enum Error {
    Compile(basc::Error),
    Image(bimg::Error),
    Run(bvm::Fault),
    Io(std::io::Error, IOErrorContext, PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IOErrorContext::ReadInput => "Reading input",
                    IOErrorContext::WriteOutput => "Writing output",
                },
                path.display(),
                err
            ),
            Error::Compile(err) => write!(f, "compile failed: {}", err),
            Error::Image(err) => write!(f, "{}", err),
            Error::Run(fault) => write!(f, "{}", fault),
        }
    }
}

/// Compiles `source` and writes the image to `output`. No image file is
/// produced when compilation fails.
pub fn compile_file<P: AsRef<Path>, Q: AsRef<Path>>(source: P, output: Q) -> Result<(), Error> {
    let source_path = source.as_ref();
    let file = File::open(source_path)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, source_path.to_owned()))?;

    let image = basc::compile(BufReader::new(file)).map_err(Error::Compile)?;

    bimg::write_file(output, &image).map_err(Error::Image)
}

/// Loads an image, copies its DATA initializer into writable memory and
/// runs it against the console host.
pub fn execute_file<P: AsRef<Path>>(path: P, stack_size: usize) -> Result<(), Error> {
    let image = bimg::read_file(path).map_err(Error::Image)?;
    run_image(image, stack_size, Console::new()).map(|_| ())
}

/// Runs a loaded image against an arbitrary host.
pub fn run_image<H: Host>(
    image: bimg::Image,
    stack_size: usize,
    host: H,
) -> Result<Interpreter<H>, Error> {
    let (entry, text, data) = image.into_parts();
    let mut interpreter =
        Interpreter::new(entry, text, bimg::IMAGE_HDR_SIZE, data, stack_size, host);
    match interpreter.run() {
        Ok(()) => Ok(interpreter),
        Err(fault) => Err(Error::Run(fault)),
    }
}

#[cfg(test)]
mod test;
