use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::Venue;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// JSON array of venues. Without one the server starts with no venues.
    pub venues_file: Option<PathBuf>,
    /// JSON object of token → owner id. Without one every write is unauthenticated.
    pub tokens_file: Option<PathBuf>,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7878,
            data_dir: PathBuf::from("./data"),
            venues_file: None,
            tokens_file: None,
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind: std::env::var("VENUEBOOK_BIND").unwrap_or(d.bind),
            port: parsed("VENUEBOOK_PORT").unwrap_or(d.port),
            data_dir: std::env::var("VENUEBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
            venues_file: std::env::var("VENUEBOOK_VENUES").ok().map(PathBuf::from),
            tokens_file: std::env::var("VENUEBOOK_TOKENS").ok().map(PathBuf::from),
            max_connections: parsed("VENUEBOOK_MAX_CONNECTIONS").unwrap_or(d.max_connections),
            compact_threshold: parsed("VENUEBOOK_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            metrics_port: parsed("VENUEBOOK_METRICS_PORT"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

/// Parse the venue catalog. Ids must be unique and names non-empty.
pub fn parse_venues(json: &str) -> io::Result<Vec<Venue>> {
    let venues: Vec<Venue> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    for v in &venues {
        if v.name.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("venue {} has no name", v.id),
            ));
        }
        if !seen.insert(v.id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("duplicate venue id {}", v.id),
            ));
        }
    }
    Ok(venues)
}

pub fn load_venues(path: &Path) -> io::Result<Vec<Venue>> {
    parse_venues(&std::fs::read_to_string(path)?)
}
