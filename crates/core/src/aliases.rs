use crate::error::IngestError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveAliases {
    aliases: HashMap<String, String>,
}

impl ArchiveAliases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_collections<'a, I>(pairs: I) -> Result<Self, IngestError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let acronym = Regex::new(r"^([A-Z]{2,})\s*:")?;
        let mut aliases = HashMap::new();
        for (collection, archive) in pairs {
            if archive.trim().is_empty() {
                continue;
            }
            if let Some(captures) = acronym.captures(collection.trim()) {
                aliases
                    .entry(captures[1].to_lowercase())
                    .or_insert_with(|| archive.trim().to_string());
            }
        }
        Ok(Self { aliases })
    }

    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let file = File::open(path)?;
        let loaded: Self = serde_json::from_reader(BufReader::new(file))?;
        let aliases = loaded
            .aliases
            .into_iter()
            .map(|(alias, archive)| (alias.to_lowercase(), archive))
            .collect();
        Ok(Self { aliases })
    }

    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.aliases.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
