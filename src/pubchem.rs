use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::domain::{ChemblId, SchemblId};
use crate::error::KiraError;
use crate::http;

const PUBCHEM_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug/compound/name";

/// Compound synonym lookup by name or registry id.
pub trait NameClient: Send + Sync {
    /// Synonyms of the best-matching compound, most preferred first. An
    /// unknown query yields an empty list.
    fn synonyms(&self, query: &str) -> Result<Vec<String>, KiraError>;
}

#[derive(Clone)]
pub struct PubchemHttpClient {
    client: Client,
    base_url: String,
}

impl PubchemHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        Self::with_base_url(PUBCHEM_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, KiraError> {
        let headers = http::default_headers(KiraError::PubchemHttp)?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| KiraError::PubchemHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn synonyms_url(&self, query: &str) -> Result<Url, KiraError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|err| KiraError::PubchemHttp(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| KiraError::PubchemHttp("base url cannot have a path".to_string()))?
            .push(query)
            .push("synonyms")
            .push("JSON");
        Ok(url)
    }
}

impl NameClient for PubchemHttpClient {
    fn synonyms(&self, query: &str) -> Result<Vec<String>, KiraError> {
        let url = self.synonyms_url(query)?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::PubchemHttp(err.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "PubChem request failed".to_string());
            return Err(KiraError::PubchemStatus { status, message });
        }
        let body: Value = response
            .json()
            .map_err(|err| KiraError::PubchemHttp(err.to_string()))?;
        Ok(parse_synonyms(&body))
    }
}

pub fn parse_synonyms(body: &Value) -> Vec<String> {
    body.get("InformationList")
        .and_then(|list| list.get("Information"))
        .and_then(|info| info.as_array())
        .and_then(|info| info.first())
        .and_then(|first| first.get("Synonym"))
        .and_then(|synonyms| synonyms.as_array())
        .map(|synonyms| {
            synonyms
                .iter()
                .filter_map(|value| value.as_str())
                .map(|value| value.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Best-effort display name; falls back to the id itself and never fails.
pub fn display_name<N: NameClient + ?Sized>(client: &N, id: &ChemblId) -> String {
    match client.synonyms(id.as_str()) {
        Ok(synonyms) => synonyms
            .into_iter()
            .next()
            .unwrap_or_else(|| id.as_str().to_string()),
        Err(err) => {
            debug!(compound = %id, error = %err, "name lookup failed");
            id.as_str().to_string()
        }
    }
}

/// First `SCHEMBL` synonym of the compound called `name`, if any.
pub fn schembl_from_synonyms<N: NameClient + ?Sized>(client: &N, name: &str) -> Option<SchemblId> {
    let synonyms = match client.synonyms(name) {
        Ok(synonyms) => synonyms,
        Err(err) => {
            debug!(name, error = %err, "synonym lookup failed");
            return None;
        }
    };
    synonyms
        .iter()
        .filter(|synonym| synonym.starts_with("SCHEMBL"))
        .find_map(|synonym| synonym.parse().ok())
}
