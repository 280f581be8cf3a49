//!
//! Where spec documents come from
//!
use crate::specs::{SpecFormat, Specs};
use crate::{Error, Result};

/// A spec document location, a local path or an `http(s)` URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecSource {
    Local(std::path::PathBuf),
    Remote(url::Url),
}

/// Raw spec document and a hint of its encoding
#[derive(Clone, Debug)]
pub struct Document {
    pub data: Vec<u8>,
    pub format: SpecFormat,
}

impl Document {
    /// Decode the document
    pub fn parse(&self) -> Result<Specs> {
        Specs::parse(&self.data, self.format)
    }
}

impl SpecSource {
    /// Anything starting with `http` is fetched, everything else is read from disk
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.starts_with("http") {
            Ok(Self::Remote(url::Url::parse(uri)?))
        } else {
            Ok(Self::Local(uri.into()))
        }
    }

    /// Read the document
    #[tracing::instrument(level = "debug")]
    pub async fn fetch(&self) -> Result<Document> {
        match self {
            Self::Local(path) => {
                let data = tokio::fs::read(path).await?;
                let format = SpecFormat::from_path(&path.to_string_lossy());
                Ok(Document { data, format })
            }
            Self::Remote(url) => {
                let response = reqwest::get(url.clone()).await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::WebServer(status.as_u16(), status.to_string()));
                }

                let format = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(SpecFormat::from_content_type)
                    .unwrap_or_else(|| SpecFormat::from_path(url.path()));
                let data = response.bytes().await?.to_vec();
                tracing::debug!("fetched {} bytes of {:?}", data.len(), format);
                Ok(Document { data, format })
            }
        }
    }
}
