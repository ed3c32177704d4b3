//! CSAR archive validation and unpacking.
//!
//! A CSAR is a zip file holding `TOSCA-Metadata/TOSCA.meta`, a YAML map
//! whose `Entry-Definitions` key names the manifest inside the archive.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use toskose_common::error::{Result, ToskoseError};

/// Archive extensions accepted as CSAR packages.
pub const ADMITTED_EXTENSIONS: &[&str] = &["zip", "csar"];

/// Location of the metadata entry inside the archive.
pub const METADATA_PATH: &str = "TOSCA-Metadata/TOSCA.meta";

const ENTRY_DEFINITIONS: &str = "Entry-Definitions";
const OPTIONAL_KEYS: &[&str] = &["Created-By", "CSAR-version", "Description"];

/// The validated content of `TOSCA.meta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsarMetadata {
    /// Path of the manifest, relative to the archive root.
    pub entry_definitions: String,
    /// Every key of the metadata file, rendered as text.
    pub entries: BTreeMap<String, String>,
}

fn malformed(archive: &Path, reason: &str) -> ToskoseError {
    tracing::error!(archive = %archive.display(), reason = %reason, "malformed CSAR");
    ToskoseError::MalformedCsar {
        message: format!("{} {reason}", archive.display()),
    }
}

fn open(archive: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| ToskoseError::fatal_io(archive, &e))?;
    zip::ZipArchive::new(file).map_err(|e| {
        tracing::error!(archive = %archive.display(), error = %e, "not a zip archive");
        malformed(archive, "is an invalid or corrupted archive")
    })
}

/// Validates a CSAR archive and returns its metadata.
///
/// # Errors
///
/// Returns a validation error if the file is missing or has an
/// unsupported extension, and a malformed-CSAR error if the archive or its
/// metadata entry does not respect the expected layout.
pub fn validate(archive: &Path) -> Result<CsarMetadata> {
    if !archive.is_file() {
        return Err(ToskoseError::validation(format!(
            "CSAR archive {} does not exist",
            archive.display()
        )));
    }
    let extension = archive
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !ADMITTED_EXTENSIONS.contains(&extension.as_str()) {
        let reason = if extension.is_empty() {
            "file extension is not recognized".to_string()
        } else {
            format!(".{extension} is an invalid file extension")
        };
        tracing::error!(archive = %archive.display(), "{reason}");
        return Err(ToskoseError::validation(reason));
    }

    tracing::debug!(archive = %archive.display(), "validating CSAR");
    let mut zip = open(archive)?;
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();

    let mut raw = String::new();
    {
        let mut entry = zip
            .by_name(METADATA_PATH)
            .map_err(|_| malformed(archive, "does not contain a valid TOSCA.meta"))?;
        let _ = entry
            .read_to_string(&mut raw)
            .map_err(|_| malformed(archive, "has an unreadable TOSCA.meta"))?;
    }

    let metadata: serde_yaml::Mapping = serde_yaml::from_str(&raw)
        .map_err(|_| malformed(archive, "has a TOSCA.meta that is not a valid map"))?;
    let entries: BTreeMap<String, String> = metadata
        .iter()
        .filter_map(|(k, v)| {
            let value = match v {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            k.as_str().map(|k| (k.to_string(), value))
        })
        .collect();

    let Some(entry_definitions) = entries.get(ENTRY_DEFINITIONS).cloned() else {
        return Err(malformed(archive, "misses Entry-Definitions in TOSCA.meta"));
    };
    if !names.iter().any(|n| n == &entry_definitions) {
        return Err(malformed(
            archive,
            "contains an invalid manifest reference in TOSCA.meta",
        ));
    }
    for key in OPTIONAL_KEYS {
        if !entries.contains_key(*key) {
            tracing::warn!(
                archive = %archive.display(),
                key = %key,
                "missing optional TOSCA.meta key"
            );
        }
    }

    Ok(CsarMetadata {
        entry_definitions,
        entries,
    })
}

/// Extracts the archive into `dir` and returns the manifest path.
///
/// # Errors
///
/// Returns a malformed-CSAR error if extraction fails.
pub fn unpack(archive: &Path, metadata: &CsarMetadata, dir: &Path) -> Result<PathBuf> {
    let mut zip = open(archive)?;
    zip.extract(dir).map_err(|e| {
        tracing::error!(archive = %archive.display(), error = %e, "extraction failed");
        malformed(archive, "cannot be extracted")
    })?;
    tracing::debug!(archive = %archive.display(), dir = %dir.display(), "CSAR unpacked");
    Ok(dir.join(&metadata.entry_definitions))
}
