use std::cell::RefCell;
use std::collections::HashMap;

use kira_patent_miner::config::SettleDelays;
use kira_patent_miner::domain::{PatentRecord, SchemblId};
use kira_patent_miner::error::KiraError;
use kira_patent_miner::portal::{
    PageLayout, PatentPortal, RenderedPortal, RowCell, RowRead, UnixLayout, WindowsLayout,
};
use kira_patent_miner::webdriver::{Browser, ElementRef};

#[derive(Default, Clone)]
struct FakeElement {
    text: String,
    href: Option<String>,
}

/// Serves a fixed DOM keyed by XPath; elements are identified by their path.
#[derive(Default)]
struct FakeBrowser {
    elements: HashMap<String, FakeElement>,
    visited: RefCell<Vec<String>>,
    clicked: RefCell<Vec<String>>,
    closed: RefCell<bool>,
}

impl FakeBrowser {
    fn with_text(mut self, xpath: String, text: &str) -> Self {
        self.elements.insert(
            xpath,
            FakeElement {
                text: text.to_string(),
                href: None,
            },
        );
        self
    }

    fn with_link(mut self, xpath: String, href: &str) -> Self {
        self.elements.insert(
            xpath,
            FakeElement {
                text: String::new(),
                href: Some(href.to_string()),
            },
        );
        self
    }
}

impl Browser for &FakeBrowser {
    fn goto(&self, url: &str) -> Result<(), KiraError> {
        self.visited.borrow_mut().push(url.to_string());
        Ok(())
    }

    fn find(&self, xpath: &str) -> Result<Option<ElementRef>, KiraError> {
        Ok(self
            .elements
            .contains_key(xpath)
            .then(|| ElementRef::new(xpath)))
    }

    fn text(&self, element: &ElementRef) -> Result<String, KiraError> {
        Ok(self
            .elements
            .get(element.as_str())
            .map(|element| element.text.clone())
            .unwrap_or_default())
    }

    fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, KiraError> {
        assert_eq!(name, "href");
        Ok(self
            .elements
            .get(element.as_str())
            .and_then(|element| element.href.clone()))
    }

    fn click(&self, element: &ElementRef) -> Result<(), KiraError> {
        self.clicked.borrow_mut().push(element.as_str().to_string());
        Ok(())
    }

    fn close(&self) -> Result<(), KiraError> {
        *self.closed.borrow_mut() = true;
        Ok(())
    }
}

fn schembl(id: &str) -> SchemblId {
    id.parse().unwrap()
}

fn compound_page(layout: &dyn PageLayout) -> FakeBrowser {
    FakeBrowser::default()
        .with_text(layout.patents_tab(), "Patents")
        .with_link(layout.listing_link(), "https://portal.test/listing/SCHEMBL7")
        .with_text(layout.total_hits(), "1,234")
}

#[test]
fn opens_compound_and_listing() {
    let browser = compound_page(&UnixLayout);
    let mut portal = RenderedPortal::new(&browser, Box::new(UnixLayout), SettleDelays::none())
        .with_base_url("https://portal.test/chemical/");

    assert!(portal.open_compound(&schembl("SCHEMBL7")).unwrap());
    assert!(portal.open_listing().unwrap());
    assert_eq!(portal.total_hits(), Some(1234));

    assert_eq!(
        *browser.visited.borrow(),
        vec![
            "https://portal.test/chemical/SCHEMBL7".to_string(),
            "https://portal.test/listing/SCHEMBL7".to_string(),
        ]
    );
    assert_eq!(*browser.clicked.borrow(), vec![UnixLayout.patents_tab()]);
}

#[test]
fn compound_without_tab_is_reported() {
    let browser = FakeBrowser::default();
    let mut portal = RenderedPortal::new(&browser, Box::new(UnixLayout), SettleDelays::none());

    assert!(!portal.open_compound(&schembl("SCHEMBL7")).unwrap());
    assert!(!portal.open_listing().unwrap());
    assert_eq!(portal.total_hits(), None);
    assert!(browser.clicked.borrow().is_empty());
}

#[test]
fn reads_rows_by_slot() {
    let layout = WindowsLayout;
    let browser = FakeBrowser::default()
        .with_text(layout.row(0), "")
        .with_text(layout.row_cell(0, RowCell::PatentNumber), "A1\nUS-2015123456-A1")
        .with_text(layout.row_cell(0, RowCell::Date), " 2015-04-30 ")
        .with_text(layout.row_cell(0, RowCell::Ipc), "A61K 31/506")
        .with_text(layout.row_cell(0, RowCell::Assignee), "NOVARTIS AG")
        .with_text(layout.row(1), "")
        .with_text(layout.row_cell(1, RowCell::Ipc), "  ");
    let mut portal = RenderedPortal::new(&browser, Box::new(WindowsLayout), SettleDelays::none());

    assert_eq!(
        portal.read_row(0).unwrap(),
        RowRead::Row(PatentRecord {
            patent_number: "US-2015123456-A1".to_string(),
            publication_date: "2015-04-30".to_string(),
            ipc: "A61K 31/506".to_string(),
            assignee: "NOVARTIS AG".to_string(),
        })
    );
    assert_eq!(portal.read_row(1).unwrap(), RowRead::Unclassified);
    assert_eq!(portal.read_row(2).unwrap(), RowRead::Absent);
}

#[test]
fn follows_pager_links() {
    let browser = FakeBrowser::default()
        .with_link(UnixLayout.next_page(true), "https://portal.test/listing?page=2")
        .with_link(UnixLayout.next_page(false), "https://portal.test/listing?page=3");
    let mut portal = RenderedPortal::new(&browser, Box::new(UnixLayout), SettleDelays::none());

    assert!(portal.next_page(true).unwrap());
    assert!(portal.next_page(false).unwrap());
    assert_eq!(
        *browser.visited.borrow(),
        vec![
            "https://portal.test/listing?page=2".to_string(),
            "https://portal.test/listing?page=3".to_string(),
        ]
    );

    let bare = FakeBrowser::default();
    let mut portal = RenderedPortal::new(&bare, Box::new(UnixLayout), SettleDelays::none());
    assert!(!portal.next_page(true).unwrap());
}

#[test]
fn finish_closes_the_session() {
    let browser = FakeBrowser::default();
    let mut portal = RenderedPortal::new(&browser, Box::new(UnixLayout), SettleDelays::none());
    portal.finish().unwrap();
    assert!(*browser.closed.borrow());
    assert_eq!(portal.layout_name(), "unix");
}
