use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::decode;
use crate::core::error::OptimizeError;
use crate::core::model::{
    AdvisoryVerdict, CandidateFile, OptimizeRequest, OptimizedResult, ServiceErrorBody,
    ValidateResponse,
};

#[derive(Debug, Clone)]
pub struct ApiContext {
    pub base: Url,
    pub user_agent: String,
    /// Deadline to the first response headers of an upload.
    pub submit_timeout: Duration,
    /// Deadline for the whole best-effort advisory call.
    pub advisory_timeout: Duration,
}

impl ApiContext {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            user_agent: format!("packpress/{}", env!("CARGO_PKG_VERSION")),
            submit_timeout: Duration::from_secs(300),
            advisory_timeout: Duration::from_secs(10),
        }
    }
}

/// Seam to the remote optimization service. The session only talks to this
/// trait, so tests can script a backend without a network.
#[async_trait]
pub trait OptimizeBackend: Send + Sync {
    /// Upload `file` and return the fully received result. Exactly one
    /// network submission per call.
    async fn submit(
        &self,
        file: &CandidateFile,
        req: OptimizeRequest,
        cancel: &CancellationToken,
    ) -> Result<OptimizedResult, OptimizeError>;

    /// Best-effort server-side validity check. Channel failures collapse to
    /// `Acceptable`; only an explicit `valid: false` rejects.
    async fn advisory_validate(&self, file: &CandidateFile) -> AdvisoryVerdict;
}

pub struct HttpBackend {
    client: reqwest::Client,
    ctx: ApiContext,
}

impl HttpBackend {
    pub fn new(ctx: ApiContext) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(ctx.user_agent.clone())
            .build()
            .expect("reqwest client");
        Self { client, ctx }
    }

    fn endpoint(&self, path: &str) -> Result<Url, OptimizeError> {
        self.ctx
            .base
            .join(path)
            .map_err(|e| OptimizeError::Transport(format!("bad api url: {e}")))
    }

    async fn multipart_form(file: &CandidateFile) -> Result<Form, OptimizeError> {
        let data = tokio::fs::read(&file.path)
            .await
            .map_err(|e| OptimizeError::Transport(format!("read {}: {e}", file.path.display())))?;
        let part = Part::bytes(data)
            .file_name(file.name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| OptimizeError::Transport(format!("build upload part: {e}")))?;
        Ok(Form::new().part("file", part))
    }

    /// Drain the body with the attempt's cancellation signal racing every
    /// chunk, so a reset mid-download actually stops the transfer.
    async fn collect_body(
        resp: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<Bytes, OptimizeError> {
        let mut stream = resp.bytes_stream();
        let mut buf = BytesMut::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(OptimizeError::Cancelled),
                chunk = stream.next() => match chunk {
                    Some(Ok(c)) => buf.extend_from_slice(&c),
                    Some(Err(e)) => {
                        return Err(OptimizeError::Transport(format!("body transfer failed: {e}")))
                    }
                    None => break,
                },
            }
        }
        Ok(buf.freeze())
    }
}

#[async_trait]
impl OptimizeBackend for HttpBackend {
    async fn submit(
        &self,
        file: &CandidateFile,
        req: OptimizeRequest,
        cancel: &CancellationToken,
    ) -> Result<OptimizedResult, OptimizeError> {
        let url = self.endpoint("optimize")?;
        let form = Self::multipart_form(file).await?;

        let mut query: Vec<(&str, String)> = vec![("quality", req.quality.to_string())];
        if let Some(px) = req.max_size {
            query.push(("max_size", px.to_string()));
        }

        tracing::debug!(name = %file.name, size = file.size, quality = req.quality, "submitting upload");

        let send = self.client.post(url).query(&query).multipart(form).send();
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(OptimizeError::Cancelled),
            r = tokio::time::timeout(self.ctx.submit_timeout, send) => match r {
                Err(_) => {
                    // Deadline hit before any headers arrived. Dropping the
                    // future aborts the request; the shared token tells
                    // everyone else this attempt is over.
                    cancel.cancel();
                    return Err(OptimizeError::Timeout(self.ctx.submit_timeout));
                }
                Ok(Err(e)) => return Err(OptimizeError::Transport(format!("network error: {e}"))),
                Ok(Ok(resp)) => resp,
            },
        };

        let status = resp.status();
        if !status.is_success() {
            let body = Self::collect_body(resp, cancel).await.unwrap_or_default();
            let message = serde_json::from_slice::<ServiceErrorBody>(&body)
                .map(|b| b.detail)
                .unwrap_or_else(|_| format!("server error {}", status.as_u16()));
            return Err(OptimizeError::Transport(message));
        }

        let stats = decode::stats_from_headers(resp.headers());
        let filename = decode::filename_from_headers(resp.headers());

        let payload = Self::collect_body(resp, cancel).await?;
        if payload.is_empty() {
            return Err(OptimizeError::EmptyResult);
        }

        Ok(OptimizedResult { payload, filename, stats })
    }

    async fn advisory_validate(&self, file: &CandidateFile) -> AdvisoryVerdict {
        let attempt = async {
            let url = self.endpoint("validate")?;
            let form = Self::multipart_form(file).await?;
            let resp = self
                .client
                .post(url)
                .multipart(form)
                .timeout(self.ctx.advisory_timeout)
                .send()
                .await
                .map_err(|e| OptimizeError::Transport(format!("network error: {e}")))?;
            if !resp.status().is_success() {
                return Err(OptimizeError::Transport(format!(
                    "validate endpoint status {}",
                    resp.status().as_u16()
                )));
            }
            resp.json::<ValidateResponse>()
                .await
                .map_err(|e| OptimizeError::Transport(format!("malformed validate body: {e}")))
        };

        match attempt.await {
            Ok(v) if !v.valid => {
                AdvisoryVerdict::Invalid(v.error.unwrap_or_else(|| "invalid archive".to_string()))
            }
            Ok(_) => AdvisoryVerdict::Acceptable,
            Err(e) => {
                // Deliberate leniency: an unavailable advisory channel never
                // penalizes the candidate.
                tracing::warn!(name = %file.name, error = %e, "advisory validation unavailable, accepting");
                AdvisoryVerdict::Acceptable
            }
        }
    }
}
