//! Retrieval of a document as it existed on a given date.
//!
//! The remote source has no changelog: the only query it answers is
//! "give me document X as valid on date D". [`Fetcher`] abstracts that query
//! so the scanner can be driven by the live HTTP source or by a fake.
//!
//! Any failure, including a non-success status, is returned as an error and
//! aborts the whole document scan. There is no retry here.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::config::SourceConfig;

/// Source of dated document content.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw content of `document_id` as of `as_of`.
    async fn fetch(&self, document_id: &str, as_of: NaiveDate) -> Result<Vec<u8>>;
}

/// Format a date the way the source expects it: `dd-mm-yyyy`.
pub fn format_as_of(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// [`Fetcher`] backed by the remote HTTP service.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    document_param: String,
    date_param: String,
}

impl HttpFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            document_param: config.document_param.clone(),
            date_param: config.date_param.clone(),
        })
    }

    /// Build the as-of request for a document.
    pub fn request(&self, document_id: &str, as_of: NaiveDate) -> reqwest::RequestBuilder {
        self.client.get(&self.base_url).query(&[
            (self.document_param.as_str(), document_id.to_string()),
            (self.date_param.as_str(), format_as_of(as_of)),
        ])
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, document_id: &str, as_of: NaiveDate) -> Result<Vec<u8>> {
        let resp = self.request(document_id, as_of).send().await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to fetch {} as of {}: {}",
                document_id,
                format_as_of(as_of),
                e
            )
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            bail!(
                "Source returned HTTP {} for {} as of {}",
                status,
                document_id,
                format_as_of(as_of)
            );
        }

        let body = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", document_id))?;
        Ok(body.to_vec())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceConfig {
        SourceConfig {
            base_url: "http://example.test/xml.php".to_string(),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn as_of_is_day_month_year() {
        let d = NaiveDate::from_ymd_opt(2004, 7, 3).unwrap();
        assert_eq!(format_as_of(d), "03-07-2004");
    }

    #[test]
    fn request_encodes_document_and_date() {
        let fetcher = HttpFetcher::new(&source()).unwrap();
        let req = fetcher
            .request("BWBR0001840", NaiveDate::from_ymd_opt(2012, 11, 30).unwrap())
            .build()
            .unwrap();
        assert_eq!(
            req.url().as_str(),
            "http://example.test/xml.php?regelingID=BWBR0001840&geldigheidsdatum=30-11-2012"
        );
    }

    #[tokio::test]
    async fn timeline_serves_version_in_effect() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        let f = timeline::TimelineFetcher::new()
            .version("A", d(2002, 5, 1), "v1")
            .version("A", d(2005, 1, 10), "v2");
        assert_eq!(f.fetch("A", d(2002, 1, 1)).await.unwrap(), b"v1");
        assert_eq!(f.fetch("A", d(2005, 1, 9)).await.unwrap(), b"v1");
        assert_eq!(f.fetch("A", d(2005, 1, 10)).await.unwrap(), b"v2");
        assert!(f.fetch("B", d(2005, 1, 10)).await.is_err());
        assert_eq!(f.total_calls(), 4);
    }
}
