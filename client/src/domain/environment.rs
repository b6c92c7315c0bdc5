use reqwest::Url;
use tracing::warn;

/// Hosts that only serve static documents, so no API can sit behind them
const STATIC_HOSTS: &[&str] = &["github.io", "github.com"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostingKind {
    /// Served by something that may also answer `/api`
    Server,
    /// A static document host
    StaticHost,
    /// Opened straight from disk
    LocalFile,
}

/// Where the site was loaded from, worked out once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    origin: String,
    hosting: HostingKind,
}

impl EnvironmentContext {
    pub fn from_origin(origin: &str) -> Self {
        let origin = origin.trim().trim_end_matches('/').to_string();
        let hosting = match Url::parse(&origin) {
            Ok(url) if url.scheme() == "file" => HostingKind::LocalFile,
            Ok(url) => {
                let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
                if STATIC_HOSTS.iter().any(|h| host.contains(h)) {
                    HostingKind::StaticHost
                } else {
                    HostingKind::Server
                }
            }
            Err(e) => {
                warn!("Cannot parse origin {origin:?} ({e}), assuming a local file");
                HostingKind::LocalFile
            }
        };

        Self { origin, hosting }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn hosting(&self) -> HostingKind {
        self.hosting
    }

    /// No server backend is possible; local storage is the only option
    pub fn is_static(&self) -> bool {
        !matches!(self.hosting, HostingKind::Server)
    }
}
