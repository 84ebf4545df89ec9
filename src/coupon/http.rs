//! Campaign lookup over HTTP.
//!
//! `GET {base_url}/campaigns/search?code=<CODE>` answering a JSON array of
//! [`Coupon`] records. A 404 is treated as an empty result.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{Coupon, CouponLookup};
use crate::domain::value_objects::CouponCode;
use crate::error::LookupError;

#[derive(Clone, Debug)]
pub struct HttpCampaignClient {
    base_url: String,
    http: Client,
}

impl HttpCampaignClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), http })
    }

    fn search_url(&self) -> String { format!("{}/campaigns/search", self.base_url) }
}

#[async_trait]
impl CouponLookup for HttpCampaignClient {
    async fn search(&self, code: &CouponCode) -> Result<Vec<Coupon>, LookupError> {
        let response = self
            .http
            .get(self.search_url())
            .query(&[("code", code.as_str())])
            .send()
            .await
            .map_err(|e| if e.is_timeout() { LookupError::Timeout } else { LookupError::Transport(e.to_string()) })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        response.json::<Vec<Coupon>>().await.map_err(|e| LookupError::Decode(e.to_string()))
    }
}
