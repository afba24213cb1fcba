pub mod bioactivity;
pub mod checkpoint;
pub mod chembl;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod harmonize;
mod http;
pub mod mapping;
pub mod output;
pub mod patents;
pub mod pipeline;
pub mod portal;
pub mod pubchem;
pub mod resolver;
pub mod store;
pub mod webdriver;
