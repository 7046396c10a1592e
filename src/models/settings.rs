use serde::{Deserialize, Serialize};

/// User-editable app settings. Each field is persisted as its own entry in
/// the key-value store and written back whenever it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    /// Gemini API credential. Refreshes are refused while this is empty.
    #[serde(default)]
    pub api_key: String,
}

fn default_title() -> String {
    "Price Tracker".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            title: default_title(),
            subtitle: String::new(),
            api_key: String::new(),
        }
    }
}
