//! The application's on-disk layout under a configurable base directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The two languages the classifiers keep separate model stores for.
pub const LANGUAGES: [&str; 2] = ["de", "en"];

/// Resolves the well-known files and directories below the base dir:
///
/// ```text
/// <base>/badnews.db      relational store
/// <base>/sessions/       web session snapshots (owned by the front end)
/// <base>/judge/{de,en}/  per-language judge token stores
/// <base>/advisor/{de,en}/  per-language advisor token stores
/// <base>/judge-cache/    judge result cache
/// <base>/advice-cache/   advisor result cache
/// <base>/blacklist.json  blacklist snapshot
/// <base>/logs/           log files
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn database(&self) -> PathBuf {
        self.base.join("badnews.db")
    }

    pub fn sessions(&self) -> PathBuf {
        self.base.join("sessions")
    }

    pub fn judge_store(&self, lang: &str) -> PathBuf {
        self.base.join("judge").join(lang)
    }

    pub fn advisor_store(&self, lang: &str) -> PathBuf {
        self.base.join("advisor").join(lang)
    }

    pub fn judge_cache(&self) -> PathBuf {
        self.base.join("judge-cache")
    }

    pub fn advice_cache(&self) -> PathBuf {
        self.base.join("advice-cache")
    }

    pub fn blacklist(&self) -> PathBuf {
        self.base.join("blacklist.json")
    }

    pub fn logs(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Create every directory of the layout. Failure here is fatal to the
    /// application.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base)?;
        fs::create_dir_all(self.sessions())?;
        for lang in LANGUAGES {
            fs::create_dir_all(self.judge_store(lang))?;
            fs::create_dir_all(self.advisor_store(lang))?;
        }
        fs::create_dir_all(self.judge_cache())?;
        fs::create_dir_all(self.advice_cache())?;
        fs::create_dir_all(self.logs())?;
        Ok(())
    }
}
