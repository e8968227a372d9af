//! Program library persistence
//!
//! Keeps every saved choreography program on disk under one data directory
//! and ensures atomic writes via temp files and renames. The layout is a
//! `meta.json` index naming the programs plus one `<id>.txt` per program
//! holding its source code; `meta.json` is written last so a crash between
//! writes never leaves the index pointing at missing code.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One saved program: a display name and its source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// Stable numeric id, unique within the library.
    pub id: u32,
    /// Display name shown by clients.
    pub name: String,
    /// Program source code.
    pub code: String,
}

/// Every saved program plus which one the daemon runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramLibrary {
    /// Id of the program selected for execution.
    pub current_program_id: u32,
    /// All saved programs.
    pub programs: Vec<ProgramEntry>,
}

impl ProgramLibrary {
    /// The entry selected for execution, if the id resolves.
    pub fn current(&self) -> Option<&ProgramEntry> {
        self.programs
            .iter()
            .find(|program| program.id == self.current_program_id)
    }

    /// Check the library is internally consistent: at least one program,
    /// unique ids, and a current id that resolves.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.programs.is_empty() {
            return Err("library must contain at least one program".to_string());
        }
        let mut seen = std::collections::BTreeSet::new();
        for program in &self.programs {
            if !seen.insert(program.id) {
                return Err(format!("duplicate program id {}", program.id));
            }
        }
        if self.current().is_none() {
            return Err(format!(
                "current program id {} does not exist",
                self.current_program_id
            ));
        }
        Ok(())
    }
}

/// On-disk index: the selected id plus `(id, name)` pairs. Code lives in
/// the per-program text files.
#[derive(Debug, Serialize, Deserialize)]
struct LibraryMeta {
    current_program_id: u32,
    all_programs: Vec<(u32, String)>,
}

/// Filesystem-backed program library.
#[derive(Debug)]
pub struct ProgramStore {
    root: PathBuf,
    library: ProgramLibrary,
}

impl ProgramStore {
    /// Open the library under `root`, creating the directory and seeding a
    /// single default program when no index exists yet.
    pub fn open(root: &Path, default_name: &str, default_code: &str) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create data directory: {:?}", root))?;

        let mut store = Self {
            root: root.to_path_buf(),
            library: ProgramLibrary {
                current_program_id: 1,
                programs: vec![ProgramEntry {
                    id: 1,
                    name: default_name.to_string(),
                    code: default_code.to_string(),
                }],
            },
        };

        if store.meta_path().exists() {
            store.library = store.load()?;
        } else {
            store.persist()?;
        }
        Ok(store)
    }

    /// The library as last loaded or saved.
    pub fn library(&self) -> &ProgramLibrary {
        &self.library
    }

    /// Replace the whole library and persist it.
    ///
    /// Returns whether the code selected for execution changed, so the
    /// caller knows to recompile and restart the running program. The
    /// library must already pass [`ProgramLibrary::validate`].
    pub fn set_library(&mut self, library: ProgramLibrary) -> Result<bool> {
        let before = self.library.current().map(|p| (p.id, p.code.clone()));
        let stale: Vec<u32> = self
            .library
            .programs
            .iter()
            .map(|p| p.id)
            .filter(|id| !library.programs.iter().any(|p| p.id == *id))
            .collect();

        self.library = library;
        self.persist()?;

        for id in stale {
            let path = self.program_path(id);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove stale program: {:?}", path))?;
            }
        }

        let after = self.library.current().map(|p| (p.id, p.code.clone()));
        Ok(before != after)
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    fn program_path(&self, id: u32) -> PathBuf {
        self.root.join(format!("{id}.txt"))
    }

    fn load(&self) -> Result<ProgramLibrary> {
        let data = fs::read(self.meta_path())
            .with_context(|| format!("Failed to read index: {:?}", self.meta_path()))?;
        let meta: LibraryMeta =
            serde_json::from_slice(&data).context("Failed to deserialize program index")?;

        let mut programs = Vec::with_capacity(meta.all_programs.len());
        for (id, name) in meta.all_programs {
            let path = self.program_path(id);
            let code = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read program code: {:?}", path))?;
            programs.push(ProgramEntry { id, name, code });
        }
        Ok(ProgramLibrary {
            current_program_id: meta.current_program_id,
            programs,
        })
    }

    /// Code files first, the index last, each write atomic.
    fn persist(&self) -> Result<()> {
        for program in &self.library.programs {
            write_atomic(&self.program_path(program.id), program.code.as_bytes())?;
        }
        let meta = LibraryMeta {
            current_program_id: self.library.current_program_id,
            all_programs: self
                .library
                .programs
                .iter()
                .map(|p| (p.id, p.name.clone()))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&meta).context("Failed to serialize program index")?;
        write_atomic(&self.meta_path(), &json)
    }
}

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;

    file.write_all(data).context("Failed to write data")?;

    file.sync_all().context("Failed to sync file")?;

    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    // Sync parent directory
    if let Some(parent) = path.parent() {
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .with_context(|| format!("Failed to open directory: {:?}", parent))?;

        dir.sync_all().context("Failed to sync directory")?;
    }

    Ok(())
}
