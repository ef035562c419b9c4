//! Application settings.

use serde::Deserialize;

/// Settings for an [`App`](crate::App).
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// # use kite::AppConfig;
/// let config: AppConfig = serde_json::from_str(r#"{"app_name":"orders","case_sensitive":true}"#).unwrap();
/// assert_eq!(config.app_name, "orders");
/// assert!(config.case_sensitive);
/// assert!(!config.strict_routing);
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Shown in the startup message.
    pub app_name: String,
    /// Value of the `Server` response header. Empty means no header.
    pub server_header: String,
    /// When set, `/foo` and `/foo/` are different routes.
    pub strict_routing: bool,
    /// When set, static segments compare case-sensitively.
    pub case_sensitive: bool,
    pub disable_startup_message: bool,
}
