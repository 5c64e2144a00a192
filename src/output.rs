use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DownloadResult, DownloadsResult, LocationResult, SearchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_downloads(result: &DownloadsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_location(result: &LocationResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
