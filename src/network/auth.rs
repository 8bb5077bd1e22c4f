//! Credential Store
//!
//! Flat-file username/password storage backing LOGIN and REGISTER: one
//! `username:password` record per line, loaded fully into memory at startup,
//! appended on registration. Plaintext storage is reproduced deliberately for
//! behavioral compatibility with the persisted format, not as a
//! recommendation.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Failure to load the credential file at startup.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The file could not be created or read.
    #[error("Failed to load credential file: {0}")]
    Io(#[from] std::io::Error),
}

/// In-memory credential map plus the append-only file behind it.
pub struct CredentialStore {
    path: PathBuf,
    users: RwLock<BTreeMap<String, String>>,
}

impl CredentialStore {
    /// Load every record from `path`, creating the file when missing.
    /// Malformed records are skipped with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path)?;
        }

        let mut users = BTreeMap::new();
        for line in BufReader::new(File::open(&path)?).lines() {
            let line = line?;
            let record = line.trim();
            if record.is_empty() {
                continue;
            }
            match record.split_once(':') {
                Some((user, pass)) if !user.is_empty() => {
                    users.insert(user.to_string(), pass.to_string());
                }
                _ => warn!(record, "skipping malformed credential record"),
            }
        }
        info!(path = %path.display(), users = users.len(), "credential store loaded");

        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    /// True when `user` exists and `pass` matches its stored password.
    pub async fn check_login(&self, user: &str, pass: &str) -> bool {
        self.users
            .read()
            .await
            .get(user)
            .is_some_and(|stored| stored == pass)
    }

    /// Insert a new record and append it to the file. Returns `false` when
    /// the username is taken, when either field cannot round-trip the
    /// colon-delimited record format, or when the append fails.
    pub async fn register(&self, user: &str, pass: &str) -> bool {
        if user.is_empty() || user.contains(':') || pass.contains(':') {
            return false;
        }

        let mut users = self.users.write().await;
        if users.contains_key(user) {
            return false;
        }
        if let Err(error) = self.append_record(user, pass) {
            warn!(%error, user, "failed to persist credential record");
            return false;
        }
        users.insert(user.to_string(), pass.to_string());
        true
    }

    /// Number of known users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    fn append_record(&self, user: &str, pass: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{user}:{pass}")
    }
}
