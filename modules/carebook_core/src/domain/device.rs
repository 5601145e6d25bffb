use serde::Serialize;

/// Description of the machine an access log entry was written on.
/// Informational only; the fields depend on what the environment exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: String,
    pub arch: String,
    pub locale: String,
    pub client: String,
    pub host: String,
}

impl DeviceInfo {
    /// Inspect the current process environment.
    pub fn detect(client: &str, host: Option<&str>) -> Self {
        let locale = ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|k| std::env::var(k).ok())
            .find(|v| !v.is_empty())
            .map(|v| v.split('.').next().unwrap_or_default().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let host = host
            .map(str::to_string)
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            locale,
            client: client.to_string(),
            host,
        }
    }

    /// One-line form stored in each entry.
    pub fn description(&self) -> String {
        format!(
            "{} {} | {} | {}",
            self.platform, self.arch, self.locale, self.client
        )
    }
}
