//! Page model of the SureChEMBL patent portal.
//!
//! The portal has no API; everything is located by structural position in the
//! rendered DOM. [`PatentPortal`] exposes the semantic operations the
//! extraction engine needs, and the positional details live in one
//! [`PageLayout`] per rendering environment.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{DEFAULT_WEBDRIVER_PORT, PatentSettings, SettleDelays};
use crate::domain::{PatentRecord, Region, SchemblId};
use crate::error::KiraError;
use crate::webdriver::{self, Browser, WebDriverSession};

pub const SURECHEMBL_BASE: &str = "https://www.surechembl.org/chemical";

/// Rows per listing page.
pub const PAGE_SIZE: u64 = 50;

/// Result of reading one row slot of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRead {
    /// Nothing rendered at this slot.
    Absent,
    /// The row exists but shows no classification code.
    Unclassified,
    Row(PatentRecord),
}

pub trait PatentPortal {
    /// Opens the compound page and its patents tab. `false` when the page
    /// has no patents tab.
    fn open_compound(&mut self, schembl: &SchemblId) -> Result<bool, KiraError>;

    /// Enters the patent listing. `false` when there is no listing link.
    fn open_listing(&mut self) -> Result<bool, KiraError>;

    /// Total hits announced by the portal for the open compound.
    fn total_hits(&self) -> Option<u64>;

    /// Reads row slot `slot` (0-based) of the current page.
    fn read_row(&mut self, slot: usize) -> Result<RowRead, KiraError>;

    /// Advances to the next listing page; `first_transition` is true when
    /// leaving page one. `false` when there is no next-page link.
    fn next_page(&mut self, first_transition: bool) -> Result<bool, KiraError>;

    /// Row slots probed per page.
    fn row_slots(&self) -> usize {
        PAGE_SIZE as usize
    }

    /// Name of the layout, for diagnostics.
    fn layout_name(&self) -> &str;

    /// Releases the rendering session.
    fn finish(&mut self) -> Result<(), KiraError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCell {
    PatentNumber,
    Date,
    Ipc,
    Assignee,
}

/// XPath locators of one rendering environment.
pub trait PageLayout: Send + Sync {
    fn name(&self) -> &'static str;
    fn patents_tab(&self) -> String;
    fn listing_link(&self) -> String;
    fn total_hits(&self) -> String {
        "//span[@class='total_hits_data']".to_string()
    }
    /// The table row at 0-based `slot`.
    fn row(&self, slot: usize) -> String;
    fn row_cell(&self, slot: usize, cell: RowCell) -> String;
    /// Pager link; the first transition uses a different position.
    fn next_page(&self, first_transition: bool) -> String;
}

const DETAIL_ROOT: &str = "/html/body/div/div/div[2]/div/div/div[3]/div[2]";

/// Layout rendered by Chrome on Linux and macOS.
pub struct UnixLayout;

/// Layout rendered by Chrome on Windows; the body root is indexed.
pub struct WindowsLayout;

impl PageLayout for UnixLayout {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn patents_tab(&self) -> String {
        format!("{DETAIL_ROOT}/ul/li[3]")
    }

    fn listing_link(&self) -> String {
        format!("{DETAIL_ROOT}/div[3]/div[3]/a")
    }

    fn row(&self, slot: usize) -> String {
        listing_row("/html/body/div", slot)
    }

    fn row_cell(&self, slot: usize, cell: RowCell) -> String {
        listing_cell("/html/body/div", slot, cell)
    }

    fn next_page(&self, first_transition: bool) -> String {
        pager_link("/html/body/div", first_transition)
    }
}

impl PageLayout for WindowsLayout {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn patents_tab(&self) -> String {
        format!("{DETAIL_ROOT}/ul/li[3]")
    }

    fn listing_link(&self) -> String {
        format!("{DETAIL_ROOT}/div[3]/div[3]/a")
    }

    fn row(&self, slot: usize) -> String {
        listing_row("/html/body/div[1]", slot)
    }

    fn row_cell(&self, slot: usize, cell: RowCell) -> String {
        listing_cell("/html/body/div[1]", slot, cell)
    }

    fn next_page(&self, first_transition: bool) -> String {
        pager_link("/html/body/div[1]", first_transition)
    }
}

pub fn layout_for(region: Region) -> Box<dyn PageLayout> {
    match region {
        Region::Linux | Region::Mac => Box::new(UnixLayout),
        Region::Windows => Box::new(WindowsLayout),
    }
}

// Row 1 of the listing table is the header, data rows start at tr[2].
fn listing_row(root: &str, slot: usize) -> String {
    format!(
        "{root}/div/div[2]/div[1]/div[2]/div/div[2]/table/tbody/tr[{}]",
        slot + 2
    )
}

fn listing_cell(root: &str, slot: usize, cell: RowCell) -> String {
    let row = listing_row(root, slot);
    match cell {
        RowCell::PatentNumber => format!("{row}/td[2]"),
        RowCell::Date => format!("{row}/td[3]"),
        RowCell::Ipc => format!("{row}/td[4]/div[1]/table/tbody/tr/td[1]"),
        RowCell::Assignee => format!("{row}/td[4]/div[1]/table/tbody/tr/td[2]/a"),
    }
}

fn pager_link(root: &str, first_transition: bool) -> String {
    let index = if first_transition { 2 } else { 4 };
    format!("{root}/div/div[2]/div[1]/div[2]/div[1]/div[3]/div[2]/ul/li[{index}]/a")
}

/// `PatentPortal` backed by a live browser session.
pub struct RenderedPortal<B: Browser> {
    browser: B,
    layout: Box<dyn PageLayout>,
    delays: SettleDelays,
    base_url: String,
    total_hits: Option<u64>,
}

impl<B: Browser> RenderedPortal<B> {
    pub fn new(browser: B, layout: Box<dyn PageLayout>, delays: SettleDelays) -> Self {
        Self {
            browser,
            layout,
            delays,
            base_url: SURECHEMBL_BASE.to_string(),
            total_hits: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn text_at(&self, xpath: &str) -> Result<Option<String>, KiraError> {
        match self.browser.find(xpath)? {
            Some(element) => Ok(Some(self.browser.text(&element)?)),
            None => Ok(None),
        }
    }

    fn href_at(&self, xpath: &str) -> Result<Option<String>, KiraError> {
        match self.browser.find(xpath)? {
            Some(element) => self.browser.attribute(&element, "href"),
            None => Ok(None),
        }
    }
}

impl<B: Browser> PatentPortal for RenderedPortal<B> {
    fn open_compound(&mut self, schembl: &SchemblId) -> Result<bool, KiraError> {
        self.total_hits = None;
        self.browser
            .goto(&format!("{}/{}", self.base_url, schembl.as_str()))?;
        settle(self.delays.detail);

        let Some(tab) = self.browser.find(&self.layout.patents_tab())? else {
            return Ok(false);
        };
        self.browser.click(&tab)?;
        settle(self.delays.patents_tab);
        Ok(true)
    }

    fn open_listing(&mut self) -> Result<bool, KiraError> {
        let Some(link) = self.href_at(&self.layout.listing_link())? else {
            return Ok(false);
        };
        self.total_hits = self
            .text_at(&self.layout.total_hits())?
            .as_deref()
            .and_then(parse_total_hits);
        debug!(total_hits = ?self.total_hits, "opening patent listing");
        self.browser.goto(&link)?;
        settle(self.delays.listing);
        Ok(true)
    }

    fn total_hits(&self) -> Option<u64> {
        self.total_hits
    }

    fn read_row(&mut self, slot: usize) -> Result<RowRead, KiraError> {
        let ipc = self
            .text_at(&self.layout.row_cell(slot, RowCell::Ipc))?
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let Some(ipc) = ipc else {
            return if self.browser.find(&self.layout.row(slot))?.is_some() {
                Ok(RowRead::Unclassified)
            } else {
                Ok(RowRead::Absent)
            };
        };

        let cell = |portal: &Self, cell: RowCell| -> Result<String, KiraError> {
            Ok(portal
                .text_at(&portal.layout.row_cell(slot, cell))?
                .unwrap_or_default())
        };
        let publication_date = cell(self, RowCell::Date)?.trim().to_string();
        let patent_number = patent_number(&cell(self, RowCell::PatentNumber)?);
        let assignee = cell(self, RowCell::Assignee)?.trim().to_string();

        Ok(RowRead::Row(PatentRecord {
            patent_number,
            publication_date,
            ipc,
            assignee,
        }))
    }

    fn next_page(&mut self, first_transition: bool) -> Result<bool, KiraError> {
        let Some(link) = self.href_at(&self.layout.next_page(first_transition))? else {
            return Ok(false);
        };
        self.browser.goto(&link)?;
        settle(self.delays.next_page);
        Ok(true)
    }

    fn layout_name(&self) -> &str {
        self.layout.name()
    }

    fn finish(&mut self) -> Result<(), KiraError> {
        self.browser.close()
    }
}

/// Opens a browser session as configured: an already running WebDriver
/// server when a URL is set, otherwise a spawned `chromedriver`.
pub fn open_rendered_portal(
    settings: &PatentSettings,
) -> Result<RenderedPortal<WebDriverSession>, KiraError> {
    let session = match (&settings.webdriver_url, &settings.chromedriver) {
        (Some(url), _) => WebDriverSession::connect(url)?,
        (None, Some(path)) => WebDriverSession::spawn(path, DEFAULT_WEBDRIVER_PORT)?,
        (None, None) => {
            let path = webdriver::find_chromedriver().ok_or_else(|| {
                KiraError::MissingTool(
                    "chromedriver (pass --chromedriver or --webdriver-url)".to_string(),
                )
            })?;
            WebDriverSession::spawn(&path, DEFAULT_WEBDRIVER_PORT)?
        }
    };
    warn!(
        region = %settings.region,
        "reading the patent portal with the {} layout; set --region to the rendering platform",
        settings.region
    );
    Ok(RenderedPortal::new(
        session,
        layout_for(settings.region),
        settings.delays,
    ))
}

/// Parses the portal's hit counter, e.g. `1,234`.
pub fn parse_total_hits(text: &str) -> Option<u64> {
    let digits = text
        .chars()
        .filter(|ch| ch.is_ascii_digit())
        .collect::<String>();
    digits.parse().ok()
}

// The number cell renders the document kind on its first line and the
// publication number on the second.
fn patent_number(cell: &str) -> String {
    let mut lines = cell.lines().map(str::trim).filter(|line| !line.is_empty());
    let first = lines.next().unwrap_or_default();
    lines.next().unwrap_or(first).to_string()
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
