use std::io::{Cursor, ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use image::{DynamicImage, ImageFormat};
use tracing::info;

use crate::error::{ExtractError, OcrError};

/// Anything that turns a decoded image into text.
pub trait OcrEngine: Send + Sync {
    fn image_to_string(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

const TESSERACT_BIN: &str = "tesseract";

/// Runs the `tesseract` binary, feeding the image as PNG over stdin.
pub struct TesseractCli {
    binary: String,
}

impl Default for TesseractCli {
    fn default() -> Self {
        TesseractCli {
            binary: TESSERACT_BIN.to_string(),
        }
    }
}

impl TesseractCli {
    #[cfg(test)]
    pub fn with_binary(binary: &str) -> Self {
        TesseractCli {
            binary: binary.to_string(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin")
            .arg("stdout")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl OcrEngine for TesseractCli {
    fn image_to_string(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = self.command().spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => OcrError::Unavailable(format!("`{}` not found", self.binary)),
            _ => OcrError::Io(e),
        })?;

        // tesseract reads the whole image before writing anything, so writing
        // up front cannot fill the stdout pipe.
        // A child that exits early breaks the pipe; its exit status and stderr
        // say more than the write error, so the child is always reaped first.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&png),
            None => Ok(()),
        };

        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub fn extract(engine: &dyn OcrEngine, path: &Path) -> Result<String, ExtractError> {
    let image = image::open(path).map_err(|source| ExtractError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let text = engine.image_to_string(&image)?;
    info!("Extracted text from {}: {}", path.display(), text);

    Ok(text)
}
