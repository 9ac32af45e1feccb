//! Per-call execution context: virtual file namespace, output/temp paths,
//! host facts, and the spreadsheet helper surface.
//!
//! Everything here is plain Rust; the op layer in [`crate::ops`] is a thin
//! bridge that exposes these methods to the isolate as the frozen `ctx`
//! object.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::json;

use crate::error::EngineError;

/// Application-scoped folder name. Output paths are deterministic per
/// host/platform because they always live under this folder.
pub const APP_DIR_NAME: &str = "tsbox";

const OUTPUT_DIR_NAME: &str = "output";
const TEMP_DIR_NAME: &str = "tmp";

/// Well-known MIME types exposed to scripts as `ctx.xlsx.mimeTypes`.
pub const MIME_TYPES: &[(&str, &str)] = &[
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("xlsm", "application/vnd.ms-excel.sheet.macroEnabled.12"),
    ("xls", "application/vnd.ms-excel"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("pdf", "application/pdf"),
    ("html", "text/html"),
];

/// Platform default for the application-scoped base directory.
pub fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

static OUTPUT_NAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// Collision-resistant output file name: `<base>_<millis>-<seq>.<ext>`.
///
/// The token combines a millisecond timestamp with a process-wide sequence
/// number, so repeated calls in the same process never collide.
pub fn unique_output_name(base: &str, ext: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = OUTPUT_NAME_SEQ.fetch_add(1, Ordering::Relaxed);
    let base = sanitize_component(base);
    let ext = ext.trim_start_matches('.');
    format!("{base}_{millis}-{seq}.{ext}")
}

/// Strip anything that could escape the output directory from a
/// caller-supplied name component.
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '-',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim_matches('.').trim();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reduce a logical name to a bare file name usable under the output
/// directory. Directory components are dropped, not honored.
fn output_file_name(name: &str) -> io::Result<String> {
    let file_name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if file_name.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid output file name: {name:?}"),
        ));
    }
    Ok(sanitize_component(&file_name))
}

/// Read-only facts about the host, exposed as `ctx.env`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostFacts {
    pub platform: &'static str,
    pub arch: &'static str,
}

impl HostFacts {
    pub fn gather() -> Self {
        Self {
            platform: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}

/// Output and temp directories for one call, under the application-scoped
/// base directory.
#[derive(Debug, Clone)]
pub struct CallPaths {
    pub output: PathBuf,
    pub temp: PathBuf,
}

impl CallPaths {
    /// Resolve the pair from an optional base override.
    pub fn resolve(base_override: Option<&Path>) -> Self {
        let base = base_override
            .map(Path::to_path_buf)
            .unwrap_or_else(default_base_dir);
        Self {
            output: base.join(OUTPUT_DIR_NAME),
            temp: base.join(TEMP_DIR_NAME),
        }
    }

    /// Create both directories if absent.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.output)?;
        std::fs::create_dir_all(&self.temp)?;
        Ok(())
    }
}

/// Virtual file namespace backed by the caller's logical-name map.
///
/// Reads are limited to mapped targets, real paths the script names, and
/// files already under the output directory. Writes always land under the
/// output directory and are all-or-nothing.
#[derive(Debug)]
pub struct VirtualFiles {
    map: BTreeMap<String, PathBuf>,
    paths: CallPaths,
}

impl VirtualFiles {
    pub fn new(map: BTreeMap<String, PathBuf>, paths: CallPaths) -> Self {
        Self { map, paths }
    }

    pub fn paths(&self) -> &CallPaths {
        &self.paths
    }

    /// Candidate real path for reading a logical name, if any.
    fn resolve_read_path(&self, name: &str) -> Option<PathBuf> {
        if let Some(mapped) = self.map.get(name) {
            return Some(mapped.clone());
        }
        let literal = Path::new(name);
        if literal.is_absolute() && literal.exists() {
            return Some(literal.to_path_buf());
        }
        let derived = self.paths.output.join(name);
        if derived.exists() {
            return Some(derived);
        }
        None
    }

    /// Read the bytes behind a logical name.
    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        let path = self.resolve_read_path(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("File not found: {name}"))
        })?;
        std::fs::read(&path)
    }

    /// Read a logical name as UTF-8 text.
    pub fn read_text(&self, name: &str) -> io::Result<String> {
        let bytes = self.read(name)?;
        String::from_utf8(bytes).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("File is not valid UTF-8: {name}"),
            )
        })
    }

    /// Write bytes under the output directory and return the absolute real
    /// path. The write is atomic: a temp file is renamed into place.
    pub fn write(&self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        self.paths.ensure()?;
        let file_name = output_file_name(name)?;
        let target = self.paths.output.join(&file_name);
        let staging = self
            .paths
            .output
            .join(format!(".{}.{}", file_name, uuid::Uuid::new_v4()));
        std::fs::write(&staging, data)?;
        match std::fs::rename(&staging, &target) {
            Ok(()) => Ok(target),
            Err(err) => {
                let _ = std::fs::remove_file(&staging);
                Err(err)
            }
        }
    }

    /// Whether a logical name currently resolves to an existing file.
    pub fn exists(&self, name: &str) -> bool {
        self.resolve_read_path(name)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Real path for a logical name: the mapped target, or the derived
    /// location under the output directory.
    pub fn get_path(&self, name: &str) -> PathBuf {
        match self.map.get(name) {
            Some(mapped) => mapped.clone(),
            None => self.paths.output.join(name),
        }
    }

    /// Logical names supplied by the caller, in stable order.
    pub fn list_mapped(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }

    /// Deterministic path under the output directory. Does not create the
    /// file.
    pub fn create_output_path(&self, filename: &str) -> io::Result<PathBuf> {
        let file_name = output_file_name(filename)?;
        Ok(self.paths.output.join(file_name))
    }
}

/// Configuration literal injected into the isolate before the bootstrap
/// script assembles the frozen `ctx` object.
pub fn bootstrap_config(
    files: &VirtualFiles,
    inputs: &serde_json::Value,
) -> Result<String, EngineError> {
    let mime: serde_json::Map<String, serde_json::Value> = MIME_TYPES
        .iter()
        .map(|(ext, mime)| (ext.to_string(), json!(mime)))
        .collect();
    let inputs = if inputs.is_null() {
        json!({})
    } else {
        inputs.clone()
    };
    let config = json!({
        "paths": {
            "output": files.paths().output.to_string_lossy(),
            "temp": files.paths().temp.to_string_lossy(),
        },
        "env": HostFacts::gather(),
        "inputs": inputs,
        "mimeTypes": mime,
    });
    serde_json::to_string(&config)
        .map_err(|e| EngineError::Internal(format!("context serialization failed: {e}")))
}
