//! On-disk persona storage.
//!
//! Layout under the output directory:
//!
//! ```text
//! personas/<ns>/PERSONA-<id>.json   one file per persona
//! personas/<ns>_personas.json       personas from the latest run
//! <ns>_personas.zip                 archive of personas/<ns>/
//! all_<ns>_conve_log.csv            conversation log of the latest run
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{compare_ids, ConversationEntry, Namespace, Persona};

use super::aggregator::dedup_last_wins;

// ─────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────

const PERSONAS_DIR: &str = "personas";
const PERSONA_FILE_PREFIX: &str = "PERSONA-";
const CSV_HEADER: &str = "source,content,type,prompt_tokens,completion_tokens,timestamp";
const UTF8_BOM: &str = "\u{FEFF}";

/// Files written by one [`PersonaStore::persist`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedPaths {
    pub persona_files: Vec<PathBuf>,
    pub combined: PathBuf,
    pub archive: PathBuf,
    pub conversation_log: PathBuf,
}

// ─────────────────────────────────────────────────────────────────
// Persona Store
// ─────────────────────────────────────────────────────────────────

pub struct PersonaStore {
    root: PathBuf,
}

impl PersonaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(PERSONAS_DIR).join(namespace.as_str())
    }

    fn combined_path(&self, namespace: Namespace) -> PathBuf {
        self.root
            .join(PERSONAS_DIR)
            .join(format!("{}_personas.json", namespace))
    }

    fn archive_path(&self, namespace: Namespace) -> PathBuf {
        self.root.join(format!("{}_personas.zip", namespace))
    }

    fn log_path(&self, namespace: Namespace) -> PathBuf {
        self.root.join(format!("all_{}_conve_log.csv", namespace))
    }

    // ─────────────────────────────────────────────────────────────
    // Write
    // ─────────────────────────────────────────────────────────────

    /// Write one generation run's personas and conversation log.
    ///
    /// Existing persona files with the same ID are overwritten.
    pub fn persist(
        &self,
        namespace: Namespace,
        personas: &[Persona],
        log: &[ConversationEntry],
    ) -> Result<PersistedPaths> {
        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir).map_err(|e| Error::IoWrite {
            path: dir.clone(),
            source: e,
        })?;

        let mut persona_files = Vec::with_capacity(personas.len());
        for persona in personas {
            let id = persona.id().unwrap_or("unknown");
            let path = dir.join(persona_file_name(id));
            write_json(&path, persona)?;
            debug!(path = %path.display(), "Saved persona");
            persona_files.push(path);
        }

        let combined = self.combined_path(namespace);
        write_json(&combined, &personas)?;

        let archive = self.archive_path(namespace);
        write_archive(&dir, &archive)?;

        let conversation_log = self.log_path(namespace);
        write_conversation_log(&conversation_log, log)?;

        info!(
            namespace = %namespace,
            personas = personas.len(),
            dir = %dir.display(),
            "Persisted personas"
        );

        Ok(PersistedPaths {
            persona_files,
            combined,
            archive,
            conversation_log,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Read
    // ─────────────────────────────────────────────────────────────

    /// Every persona file saved for `namespace`, sorted by ID.
    pub fn load_namespace(&self, namespace: Namespace) -> Result<Vec<Persona>> {
        let dir = self.namespace_dir(namespace);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| Error::IoRead {
            path: dir.clone(),
            source: e,
        })?;

        let mut personas = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_persona_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(PERSONA_FILE_PREFIX) && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_persona_file {
                continue;
            }

            match read_json::<Persona>(&path) {
                Ok(persona) => personas.push(persona),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable persona file"),
            }
        }

        personas.sort_by(|a, b| by_id(a, b));
        Ok(personas)
    }

    /// Personas from the latest run of every namespace, for listing.
    ///
    /// Records without a description are hidden; duplicates keep the last
    /// record; the result is sorted by ID.
    pub fn load_all(&self) -> Result<Vec<Persona>> {
        let mut personas = Vec::new();
        for namespace in Namespace::all() {
            let path = self.combined_path(*namespace);
            if path.exists() {
                let batch: Vec<Persona> = read_json(&path)?;
                personas.extend(batch.into_iter().filter(Persona::has_description));
            }
        }

        let mut personas = dedup_last_wins(personas);
        personas.sort_by(|a, b| by_id(a, b));
        Ok(personas)
    }

    /// Load the personas named by `ids`, in request order.
    pub fn load_selected(&self, ids: &[String]) -> Result<Vec<Persona>> {
        let mut available = Vec::new();
        for namespace in Namespace::all() {
            available.extend(self.load_namespace(*namespace)?);
        }

        ids.iter()
            .map(|id| {
                available
                    .iter()
                    .find(|p| p.id() == Some(id.as_str()))
                    .cloned()
                    .ok_or_else(|| Error::PersonaNotFound {
                        persona_id: id.clone(),
                    })
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────

fn persona_file_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("{}{}.json", PERSONA_FILE_PREFIX, safe)
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|e| Error::IoWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn write_archive(dir: &Path, archive: &Path) -> Result<()> {
    let archive_err = |source| Error::Archive {
        path: archive.to_path_buf(),
        source,
    };

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| Error::IoRead {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let file = File::create(archive).map_err(|e| Error::IoWrite {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for path in &files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let bytes = fs::read(path).map_err(|e| Error::IoRead {
            path: path.clone(),
            source: e,
        })?;
        zip.start_file(name, options).map_err(archive_err)?;
        zip.write_all(&bytes).map_err(|e| Error::IoWrite {
            path: archive.to_path_buf(),
            source: e,
        })?;
    }
    zip.finish().map_err(archive_err)?;

    debug!(path = %archive.display(), files = files.len(), "Wrote persona archive");
    Ok(())
}

fn write_conversation_log(path: &Path, log: &[ConversationEntry]) -> Result<()> {
    let mut out = String::with_capacity(log.iter().map(|e| e.content.len() + 64).sum());
    out.push_str(UTF8_BOM);
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for entry in log {
        let row = [
            csv_field(entry.source.as_str()),
            csv_field(&entry.content),
            csv_field(entry.kind.as_str()),
            entry.prompt_tokens.map(|t| t.to_string()).unwrap_or_default(),
            entry.completion_tokens.map(|t| t.to_string()).unwrap_or_default(),
            csv_field(&entry.timestamp.to_rfc3339()),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }

    fs::write(path, out).map_err(|e| Error::IoWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// RFC 4180 field quoting.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn by_id(a: &Persona, b: &Persona) -> std::cmp::Ordering {
    compare_ids(a.id().unwrap_or_default(), b.id().unwrap_or_default())
}
