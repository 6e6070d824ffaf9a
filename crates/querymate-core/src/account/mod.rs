pub mod file_store;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A registered owner of a chatbot instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    /// Widget embedding key. Regenerating replaces it; the old key stops
    /// resolving to this account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Finalized context blob used to ground end-user answers. Empty until
    /// a context session has been completed and finalized.
    #[serde(default)]
    pub context_data: String,
    #[serde(default)]
    pub widget_settings: WidgetSettings,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Account {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            password_hash: password_hash.into(),
            api_key: None,
            context_data: String::new(),
            widget_settings: WidgetSettings::default(),
            created_at: chrono::Utc::now(),
        }
    }
}

pub const POWERED_BY_TEXT: &str = "Powered by QueryMate";

/// Styling for the embeddable widget. `powered_by_text` is server-fixed
/// and never accepted from client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetSettings {
    pub widget_color: String,
    pub logo_color: String,
    pub chat_window_color: String,
    pub header_color: String,
    pub header_text: String,
    pub powered_by_text: String,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            widget_color: "#667eea".to_string(),
            logo_color: "#ffffff".to_string(),
            chat_window_color: "#ffffff".to_string(),
            header_color: "#667eea".to_string(),
            header_text: "QueryMate".to_string(),
            powered_by_text: POWERED_BY_TEXT.to_string(),
        }
    }
}

/// Client-supplied widget settings update. All fields optional; empty
/// strings are treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetSettingsUpdate {
    pub widget_color: Option<String>,
    pub logo_color: Option<String>,
    pub chat_window_color: Option<String>,
    pub header_color: Option<String>,
    pub header_text: Option<String>,
}

impl WidgetSettings {
    /// Apply a client update, keeping current values where the update is
    /// absent or empty. The powered-by line always stays server-fixed.
    pub fn apply(&mut self, update: WidgetSettingsUpdate) {
        fn set(target: &mut String, value: Option<String>) {
            if let Some(v) = value {
                if !v.is_empty() {
                    *target = v;
                }
            }
        }
        set(&mut self.widget_color, update.widget_color);
        set(&mut self.logo_color, update.logo_color);
        set(&mut self.chat_window_color, update.chat_window_color);
        set(&mut self.header_color, update.header_color);
        set(&mut self.header_text, update.header_text);
        self.powered_by_text = POWERED_BY_TEXT.to_string();
    }
}

/// Trait for account storage backends.
pub trait AccountStore: Send + Sync {
    /// Create a new account. Fails with `StoreError::Conflict` when the
    /// email is already registered.
    fn create(&self, account: &Account) -> Result<(), StoreError>;

    fn find_by_email(&self, email: &str) -> Option<Account>;

    fn find_by_id(&self, id: &str) -> Option<Account>;

    /// Resolve an API key to its owning account. Exactly one account holds
    /// any given key; replaced keys resolve to nothing.
    fn find_by_api_key(&self, api_key: &str) -> Option<Account>;

    /// Persist changes to an existing account.
    fn save(&self, account: &Account) -> Result<(), StoreError>;

    /// Register a bearer token for an account, valid until `expires_at`.
    fn put_token(
        &self,
        token: &str,
        account_id: &str,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError>;

    /// Resolve an unexpired bearer token to an account id.
    fn resolve_token(&self, token: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widget_settings_defaults() {
        let settings = WidgetSettings::default();
        assert_eq!(settings.widget_color, "#667eea");
        assert_eq!(settings.header_text, "QueryMate");
        assert_eq!(settings.powered_by_text, "Powered by QueryMate");
    }

    #[test]
    fn test_apply_update_preserves_unset_fields() {
        let mut settings = WidgetSettings::default();
        settings.apply(WidgetSettingsUpdate {
            widget_color: Some("#000000".to_string()),
            header_text: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(settings.widget_color, "#000000");
        // Empty string treated as absent
        assert_eq!(settings.header_text, "QueryMate");
        assert_eq!(settings.logo_color, "#ffffff");
    }

    #[test]
    fn test_powered_by_text_is_fixed() {
        let mut settings = WidgetSettings::default();
        settings.powered_by_text = "tampered".to_string();
        settings.apply(WidgetSettingsUpdate::default());
        assert_eq!(settings.powered_by_text, "Powered by QueryMate");
    }

    #[test]
    fn test_update_ignores_unknown_client_powered_by() {
        // poweredByText in the request body simply has no field to land in
        let json = r#"{"headerText": "Support Bot", "poweredByText": "mine"}"#;
        let update: WidgetSettingsUpdate = serde_json::from_str(json).unwrap();
        let mut settings = WidgetSettings::default();
        settings.apply(update);
        assert_eq!(settings.header_text, "Support Bot");
        assert_eq!(settings.powered_by_text, "Powered by QueryMate");
    }

    #[test]
    fn test_new_account() {
        let account = Account::new("owner@example.com", "hash");
        assert!(!account.id.is_empty());
        assert!(account.api_key.is_none());
        assert!(account.context_data.is_empty());
        assert_eq!(account.widget_settings, WidgetSettings::default());
    }
}
