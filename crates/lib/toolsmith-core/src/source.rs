use std::{error::Error, fmt, path::PathBuf, time::Duration};

use tracing::info;

/// Where the documentation text is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Url(String),
}

impl DocumentSource {
    /// Classifies a location string; `http(s)://` prefixes are URLs, anything
    /// else is a filesystem path.
    #[must_use]
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        let lowered = location.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            Self::Url(location.to_string())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }

    /// Reads the document text.
    ///
    /// # Errors
    /// Returns `SourceError` if the file or URL cannot be read, the server
    /// answers with a non-success status, or the document is empty.
    pub async fn fetch(&self, timeout: Duration) -> Result<String, SourceError> {
        let text = match self {
            Self::Path(path) => tokio::fs::read_to_string(path).await?,
            Self::Url(url) => {
                let client = reqwest::Client::builder().timeout(timeout).build()?;
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::Status {
                        status: status.as_u16(),
                        url: url.clone(),
                    });
                }
                response.text().await?
            }
        };
        if text.trim().is_empty() {
            return Err(SourceError::Empty);
        }
        info!(source = %self, bytes = text.len(), "fetched documentation");
        Ok(text)
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug)]
pub enum SourceError {
    Io(std::io::Error),
    Http(reqwest::Error),
    Status { status: u16, url: String },
    Empty,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "source read failed: {err}"),
            Self::Http(err) => write!(f, "source request failed: {err}"),
            Self::Status { status, url } => write!(f, "source {url} answered {status}"),
            Self::Empty => write!(f, "source document is empty"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Http(err) => Some(err),
            Self::Status { .. } | Self::Empty => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}
