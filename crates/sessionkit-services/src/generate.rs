//! Generate a project file from a song spec and a template file

use std::io::Write;
use std::path::Path;

use sessionkit_core::{Document, SongSpec, encode};
use tempfile::NamedTempFile;
use tracing::info;

use crate::diagnose::read_document;
use crate::error::{Result, ServiceError};

/// Read a song spec; `.json` files are JSON, anything else is TOML
pub fn load_song_spec(path: &Path) -> Result<SongSpec> {
    let text = std::fs::read_to_string(path).map_err(|source| ServiceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    } else {
        toml::from_str(&text).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| ServiceError::SongSpec {
        path: path.to_path_buf(),
        message,
    })
}

/// Generate from `template` and write the result to `out`.
///
/// The file is written to a temporary sibling and renamed into place, so
/// `out` is untouched when any step fails.
pub fn generate(spec: &SongSpec, template: &Path, out: &Path) -> Result<Document> {
    let template_doc = read_document(template)?;
    let doc = sessionkit_core::generate(spec, &template_doc)?;
    let bytes = encode(&doc)?;

    let dir = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(&bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(out).map_err(|e| ServiceError::Io(e.error))?;

    info!(
        song = %spec.name,
        template = %template.display(),
        out = %out.display(),
        bytes = bytes.len(),
        "Generated project"
    );
    Ok(doc)
}
