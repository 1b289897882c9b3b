use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::WriteError;
use crate::model::record::ResultRecord;

const INDENT: &[u8] = b"    ";

/// Writes the whole result list as one pretty-printed JSON array, replacing
/// whatever is at `path`.
pub fn write(results: &[ResultRecord], path: &Path) -> Result<(), WriteError> {
    let mut bytes = Vec::new();
    let mut ser = Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(INDENT));
    results.serialize(&mut ser)?;
    bytes.push(b'\n');

    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let tmp = tmp_path(path);

    if let Some(parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    fs::write(&tmp, bytes).map_err(io_err)?;

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(n) => n.to_string(),
        None => "output.json".to_string(),
    };
    p.set_file_name(format!("{file_name}.tmp"));
    p
}
