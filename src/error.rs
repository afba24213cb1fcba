use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid ChEMBL compound id: {0}")]
    InvalidChemblId(String),

    #[error("invalid ChEMBL target id: {0}")]
    InvalidTargetId(String),

    #[error("invalid SureChEMBL id: {0}")]
    InvalidSchemblId(String),

    #[error("invalid file separator: {0} (expected comma, tab or semicolon)")]
    InvalidSeparator(String),

    #[error("invalid analysis name: {0}")]
    InvalidAnalysisName(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("{mode} identifiers require the {table} mapping table")]
    #[diagnostic(help("pass the table path on the command line or set it in kira-pm.json"))]
    MissingMappingTable { mode: String, table: String },

    #[error("failed to load mapping table {path}: {message}")]
    MappingTable { path: String, message: String },

    #[error("missing output of an earlier stage: {0}")]
    #[diagnostic(help("run the chemical extractor for this analysis first"))]
    MissingStageOutput(String),

    #[error("input file {path} has no column named {column}")]
    #[diagnostic(help("rename the column to \"uniprot\", \"symbol\" or \"chembl_target\""))]
    MissingColumn { path: String, column: String },

    #[error("ChEMBL request failed: {0}")]
    ChemblHttp(String),

    #[error("ChEMBL returned status {status}: {message}")]
    ChemblStatus { status: u16, message: String },

    #[error("PubChem request failed: {0}")]
    PubchemHttp(String),

    #[error("PubChem returned status {status}: {message}")]
    PubchemStatus { status: u16, message: String },

    #[error("mapping download failed: {0}")]
    MappingHttp(String),

    #[error("mapping download returned status {status}: {message}")]
    MappingStatus { status: u16, message: String },

    #[error("webdriver request failed: {0}")]
    WebDriverHttp(String),

    #[error("webdriver error {error}: {message}")]
    WebDriver { error: String, message: String },

    #[error("no patent listing rows located: {0}")]
    #[diagnostic(help("the --region value probably does not match the rendering environment"))]
    LayoutMismatch(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("state file {path} is corrupt: {message}")]
    StateFile { path: String, message: String },
}

impl KiraError {
    /// Errors that mean the run was misconfigured rather than an item failing.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KiraError::MissingMappingTable { .. }
                | KiraError::MappingTable { .. }
                | KiraError::MissingStageOutput(_)
                | KiraError::MissingColumn { .. }
                | KiraError::ConfigRead(_)
                | KiraError::ConfigParse(_)
                | KiraError::MissingInput(_)
                | KiraError::LayoutMismatch(_)
                | KiraError::MissingTool(_)
                | KiraError::InvalidSeparator(_)
                | KiraError::InvalidAnalysisName(_)
        )
    }
}
