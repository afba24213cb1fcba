use crate::domain::{IdentifierMode, TargetChemblId, TargetInput};
use crate::error::KiraError;
use crate::mapping::ResolverTables;

/// Maps protein identifiers to ChEMBL target ids using static tables only.
#[derive(Debug, Clone)]
pub struct Resolver {
    tables: ResolverTables,
    mode: IdentifierMode,
}

impl Resolver {
    /// Symbol mode without a symbol table is rejected here, once, rather than
    /// failing on every lookup.
    pub fn new(tables: ResolverTables, mode: IdentifierMode) -> Result<Self, KiraError> {
        if mode == IdentifierMode::Symbol && tables.symbol_to_uniprot.is_none() {
            return Err(KiraError::MissingMappingTable {
                mode: mode.to_string(),
                table: "HGNC symbol to UniProt".to_string(),
            });
        }
        Ok(Self { tables, mode })
    }

    pub fn mode(&self) -> IdentifierMode {
        self.mode
    }

    /// `None` means the target cannot be mapped and should be skipped.
    pub fn resolve(&self, target: &TargetInput) -> Option<TargetChemblId> {
        match target {
            TargetInput::ByTargetId(id) => id.parse().ok(),
            TargetInput::ByAccession(accession) => self.by_accession(accession),
            TargetInput::BySymbol(symbol) => {
                let accession = self.tables.symbol_to_uniprot.as_ref()?.get(symbol)?;
                self.by_accession(accession)
            }
        }
    }

    fn by_accession(&self, accession: &str) -> Option<TargetChemblId> {
        self.tables.uniprot_to_target.get(accession).cloned()
    }
}
