use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::util::safe_filename;

use super::{Account, AccountStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenRecord {
    account_id: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// File-based account store: one JSON file per account under
/// `accounts/`, plus a single `tokens.json` table for bearer tokens.
/// Lookups by id and API key scan the directory, which is fine at
/// file-store scale.
pub struct FileAccountStore {
    accounts_dir: PathBuf,
    tokens_path: PathBuf,
    tokens: Mutex<HashMap<String, TokenRecord>>,
}

impl FileAccountStore {
    pub fn new(data_dir: &Path) -> Self {
        let accounts_dir = data_dir.join("accounts");
        std::fs::create_dir_all(&accounts_dir).ok();
        let tokens_path = data_dir.join("tokens.json");
        let tokens = Self::load_tokens(&tokens_path);
        Self {
            accounts_dir,
            tokens_path,
            tokens: Mutex::new(tokens),
        }
    }

    fn load_tokens(path: &Path) -> HashMap<String, TokenRecord> {
        if !path.exists() {
            return HashMap::new();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Failed to parse token table: {}", e);
                HashMap::new()
            }),
            Err(e) => {
                warn!("Failed to read token table: {}", e);
                HashMap::new()
            }
        }
    }

    fn persist_tokens(&self, tokens: &HashMap<String, TokenRecord>) {
        match serde_json::to_string_pretty(tokens) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.tokens_path, json) {
                    warn!("Failed to save token table: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize token table: {}", e),
        }
    }

    fn account_path(&self, email: &str) -> PathBuf {
        self.accounts_dir
            .join(format!("{}.json", safe_filename(email)))
    }

    fn load(&self, path: &Path) -> Option<Account> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read account {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!("Failed to parse account {}: {}", path.display(), e);
                None
            }
        }
    }

    fn scan<F>(&self, mut matches: F) -> Option<Account>
    where
        F: FnMut(&Account) -> bool,
    {
        let entries = std::fs::read_dir(&self.accounts_dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(account) = self.load(&path) {
                if matches(&account) {
                    return Some(account);
                }
            }
        }
        None
    }

    fn write(&self, account: &Account) -> Result<(), StoreError> {
        let path = self.account_path(&account.email);
        let json = serde_json::to_string_pretty(account)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| StoreError::Write(e.to_string()))
    }
}

impl AccountStore for FileAccountStore {
    fn create(&self, account: &Account) -> Result<(), StoreError> {
        if self.account_path(&account.email).exists() {
            return Err(StoreError::Conflict(account.email.clone()));
        }
        self.write(account)
    }

    fn find_by_email(&self, email: &str) -> Option<Account> {
        let path = self.account_path(email);
        if path.exists() {
            self.load(&path)
        } else {
            None
        }
    }

    fn find_by_id(&self, id: &str) -> Option<Account> {
        self.scan(|a| a.id == id)
    }

    fn find_by_api_key(&self, api_key: &str) -> Option<Account> {
        if api_key.is_empty() {
            return None;
        }
        self.scan(|a| a.api_key.as_deref() == Some(api_key))
    }

    fn save(&self, account: &Account) -> Result<(), StoreError> {
        self.write(account)
    }

    fn put_token(
        &self,
        token: &str,
        account_id: &str,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| StoreError::Write("token table lock poisoned".to_string()))?;
        // Each insert rewrites the table, so drop expired rows here to keep
        // it from growing one dead entry per login.
        let now = chrono::Utc::now();
        tokens.retain(|_, record| record.expires_at >= now);
        tokens.insert(
            token.to_string(),
            TokenRecord {
                account_id: account_id.to_string(),
                expires_at,
            },
        );
        self.persist_tokens(&tokens);
        Ok(())
    }

    fn resolve_token(&self, token: &str) -> Option<String> {
        let tokens = self.tokens.lock().ok()?;
        let record = tokens.get(token)?;
        if record.expires_at < chrono::Utc::now() {
            return None;
        }
        Some(record.account_id.clone())
    }
}
