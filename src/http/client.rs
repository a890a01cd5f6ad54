use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use crate::http::engine::{EngineResponse, HttpEngine, HttpError, PostPayload};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str =
    "Mozilla/4.0 (compatible; MSIE 7.0; Windows NT 5.1; .NET CLR 1.1.4322; \
     .NET CLR 2.0.50727; .NET CLR 3.0.04506.30; .NET CLR 3.0.4506.2152; .NET CLR 3.5.30729)";

/// 基于 reqwest 的 HTTP 引擎
///
/// 连接池由内部 Client 维护，可以 clone 共享。
pub struct ReqwestEngine {
    inner: Client,
}

impl ReqwestEngine {
    pub fn new() -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-us"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("*/*"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(DEFAULT_USER_AGENT),
        );

        let inner = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .expect("Failed to build HTTP client");

        Self { inner }
    }

    async fn finish(
        builder: reqwest::RequestBuilder,
        headers: &[(String, String)],
    ) -> Result<EngineResponse, HttpError> {
        let mut builder = builder;
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let duration = start.elapsed();

        Ok(EngineResponse::new(status, body, duration))
    }
}

impl Default for ReqwestEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpEngine for ReqwestEngine {
    async fn get(
        &self,
        url: &str,
        parameters: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<EngineResponse, HttpError> {
        let url = if parameters.is_empty() {
            url::Url::parse(url)?
        } else {
            url::Url::parse_with_params(url, parameters)?
        };
        Self::finish(self.inner.get(url), headers).await
    }

    async fn post(
        &self,
        url: &str,
        payload: PostPayload<'_>,
        headers: &[(String, String)],
    ) -> Result<EngineResponse, HttpError> {
        let url = url::Url::parse(url)?;
        let builder = match payload {
            PostPayload::Body(text) => self.inner.post(url).body(text.to_owned()),
            PostPayload::Params(params) => self.inner.post(url).form(params),
        };
        Self::finish(builder, headers).await
    }
}
