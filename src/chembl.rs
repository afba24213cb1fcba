use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::domain::{ChemblId, TargetChemblId};
use crate::error::KiraError;
use crate::http;

/// pChEMBL threshold at or above which a measurement counts as active.
pub const ACTIVE_PCHEMBL: f64 = 6.0;

/// Biochemical and functional assays only.
pub const ASSAY_TYPE_PATTERN: &str = "(B|F)";

const CHEMBL_HOST: &str = "https://www.ebi.ac.uk";
const PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub molecule: ChemblId,
    pub pchembl: Option<f64>,
}

impl Activity {
    pub fn is_active(&self) -> bool {
        is_active(self.pchembl)
    }
}

pub fn is_active(pchembl: Option<f64>) -> bool {
    matches!(pchembl, Some(value) if value >= ACTIVE_PCHEMBL)
}

pub trait ChemblClient: Send + Sync {
    /// Every biochemical/functional activity recorded against `target`.
    fn activities(&self, target: &TargetChemblId) -> Result<Vec<Activity>, KiraError>;
}

#[derive(Clone)]
pub struct ChemblHttpClient {
    client: Client,
    base_url: String,
}

impl ChemblHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        Self::with_base_url(CHEMBL_HOST)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, KiraError> {
        let headers = http::default_headers(KiraError::ChemblHttp)?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| KiraError::ChemblHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn first_page_url(&self, target: &TargetChemblId) -> String {
        format!(
            "{}/chembl/api/data/activity.json?target_chembl_id={}&assay_type__iregex={}&only=pchembl_value,molecule_chembl_id&limit={PAGE_LIMIT}",
            self.base_url,
            target.as_str(),
            ASSAY_TYPE_PATTERN
        )
    }

    fn absolute(&self, next: &str) -> String {
        if next.starts_with("http") {
            next.to_string()
        } else {
            format!("{}{}", self.base_url, next)
        }
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, KiraError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::ChemblHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "ChEMBL request failed".to_string());
        Err(KiraError::ChemblStatus { status, message })
    }
}

impl ChemblClient for ChemblHttpClient {
    fn activities(&self, target: &TargetChemblId) -> Result<Vec<Activity>, KiraError> {
        let mut activities = Vec::new();
        let mut url = Some(self.first_page_url(target));
        while let Some(current) = url.take() {
            let response = self.send_with_retries(|| self.client.get(&current))?;
            let response = Self::handle_status(response)?;
            let page: Value = response
                .json()
                .map_err(|err| KiraError::ChemblHttp(err.to_string()))?;
            let (items, next) = parse_activity_page(&page)?;
            debug!(chembl_target = %target, items = items.len(), "fetched activity page");
            activities.extend(items);
            url = next.map(|next| self.absolute(&next));
        }
        Ok(activities)
    }
}

/// Extracts activities and the relative `next` link from one API page.
pub fn parse_activity_page(page: &Value) -> Result<(Vec<Activity>, Option<String>), KiraError> {
    let items = page
        .get("activities")
        .and_then(|value| value.as_array())
        .ok_or_else(|| KiraError::ChemblHttp("response has no activities array".to_string()))?;

    let activities = items
        .iter()
        .filter_map(|item| {
            let molecule = item
                .get("molecule_chembl_id")
                .and_then(|value| value.as_str())?
                .parse::<ChemblId>()
                .ok()?;
            let pchembl = item.get("pchembl_value").and_then(parse_number);
            Some(Activity { molecule, pchembl })
        })
        .collect();

    let next = page
        .get("page_meta")
        .and_then(|meta| meta.get("next"))
        .and_then(|value| value.as_str())
        .map(|value| value.to_string());

    Ok((activities, next))
}

// ChEMBL serializes pchembl_value as a decimal string.
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
