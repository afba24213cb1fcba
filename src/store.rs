use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;

use crate::domain::AnalysisName;
use crate::error::KiraError;

/// On-disk layout of every state file and report.
///
/// The project root (`.kira-pm/` in the working directory) holds the
/// per-analysis caches that make stages resumable. The cache root holds
/// downloads that are shared between projects, such as ChEMBL release
/// mapping files.
#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, KiraError> {
        let cwd = std::env::current_dir().map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(".kira-pm"))
            .map_err(|_| KiraError::Filesystem("invalid project path".to_string()))?;

        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-patent-miner"))
                    .ok()
            })
            .ok_or_else(|| {
                KiraError::Filesystem("unable to resolve cache directory".to_string())
            })?;

        Ok(Self {
            project_root,
            cache_root,
        })
    }

    pub fn new_with_paths(project_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            project_root,
            cache_root,
        }
    }

    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn mappers_dir(&self) -> Utf8PathBuf {
        self.project_root.join("mappers")
    }

    pub fn patents_dir(&self) -> Utf8PathBuf {
        self.project_root.join("patents")
    }

    pub fn gene_to_chemicals_path(&self, analysis: &AnalysisName) -> Utf8PathBuf {
        self.mappers_dir()
            .join(format!("{analysis}_gene_to_chemicals.json"))
    }

    pub fn chemical_names_path(&self, analysis: &AnalysisName) -> Utf8PathBuf {
        self.mappers_dir()
            .join(format!("{analysis}_chemical_names.json"))
    }

    /// Compounds the synonym fallback found no SureChEMBL id for.
    pub fn unmapped_chemicals_path(&self, analysis: &AnalysisName) -> Utf8PathBuf {
        self.mappers_dir()
            .join(format!("{analysis}_unmapped_chemicals.json"))
    }

    pub fn chemicals_path(&self, analysis: &AnalysisName) -> Utf8PathBuf {
        self.patents_dir().join(format!("{analysis}_chemicals.tsv"))
    }

    pub fn patent_data_path(&self, analysis: &AnalysisName) -> Utf8PathBuf {
        self.patents_dir()
            .join(format!("{analysis}_patent_data.tsv"))
    }

    pub fn cleaned_patent_path(&self, analysis: &AnalysisName) -> Utf8PathBuf {
        self.patents_dir()
            .join(format!("cleaned_{analysis}_patent_data.tsv"))
    }

    pub fn gene_patent_path(&self, analysis: &AnalysisName) -> Utf8PathBuf {
        self.patents_dir()
            .join(format!("{analysis}_gene_patent_data.tsv"))
    }

    pub fn cache_chembl_mapping_path(&self, release: &str) -> Utf8PathBuf {
        self.cache_root
            .join("chembl")
            .join(format!("chembl_{release}_uniprot_mapping.txt"))
    }

    pub fn ensure_project_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.mappers_dir().as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::create_dir_all(self.patents_dir().as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn ensure_cache_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    /// Replaces `path` with `content` so readers never observe a half-written file.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".kira-pm-state")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn read_optional(path: &Utf8Path) -> Result<Option<Vec<u8>>, KiraError> {
        match fs::read(path.as_std_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(KiraError::Filesystem(format!("read {path}: {err}"))),
        }
    }
}
