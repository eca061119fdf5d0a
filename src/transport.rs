use std::sync::Arc;

use anyhow::Context as _;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::env::SelectedFile;
use crate::progress::Progress;

pub const FILE_FIELD: &str = "file";
pub const REUSABLE_FIELD: &str = "reusable";
pub const REUSABLE_ON: &str = "on";

const CHUNK_SIZE: usize = 64 * 1024;

/// Multipart body of one upload.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub file: SelectedFile,
    pub reusable: bool,
}

impl UploadForm {
    /// Text fields sent next to the file part.
    pub fn text_fields(&self) -> Vec<(&'static str, &'static str)> {
        if self.reusable {
            vec![(REUSABLE_FIELD, REUSABLE_ON)]
        } else {
            Vec::new()
        }
    }
}

/// Bytes of the request body sent so far. `total` is `None` when the length
/// is not known up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct UploadResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be built.
    #[error("invalid upload request: {0}")]
    Request(String),
    /// The request did not complete.
    #[error("network error: {0}")]
    Network(String),
}

/// Sends one multipart POST and reports upload progress on `progress`.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn post_multipart(
        &self,
        url: &Url,
        form: UploadForm,
        progress: UnboundedSender<UploadProgress>,
    ) -> Result<UploadResponse, TransportError>;
}

/// [`Transport`] over a cookie-keeping `reqwest` client.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    progress: Option<Arc<Progress>>,
}

impl HttpTransport {
    pub fn new(user_agent: &str, progress: Option<Arc<Progress>>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build reqwest client")?;
        Ok(Self { client, progress })
    }

    /// Loads a page for display. Non-success statuses are errors here.
    pub async fn get_page(&self, url: &Url) -> anyhow::Result<(Url, String)> {
        if let Some(p) = &self.progress {
            p.set_stage(format!("GET {url}"));
        }
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {} failed with status {}", url, status);
        }
        let final_url = resp.url().clone();
        let text = resp.text().await.context("read response body")?;
        Ok((final_url, text))
    }
}

impl Transport for HttpTransport {
    async fn post_multipart(
        &self,
        url: &Url,
        form: UploadForm,
        progress: UnboundedSender<UploadProgress>,
    ) -> Result<UploadResponse, TransportError> {
        let total = form.file.len();
        if let Some(p) = &self.progress {
            p.upload_started(&form.file.name, total);
        }

        let body = progress_body(form.file.bytes.clone(), progress, self.progress.clone());
        let part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(form.file.name.clone())
            .mime_str(&form.file.content_type)
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let mut multipart = reqwest::multipart::Form::new().part(FILE_FIELD, part);
        for (name, value) in form.text_fields() {
            multipart = multipart.text(name, value);
        }

        tracing::debug!(%url, file = %form.file.name, bytes = total, reusable = form.reusable, "POST upload");
        let result = async {
            let resp = self
                .client
                .post(url.clone())
                .multipart(multipart)
                .send()
                .await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>(UploadResponse { status, body })
        }
        .await;

        match result {
            Ok(resp) => {
                if let Some(p) = &self.progress {
                    p.upload_finished(&format!("status {}", resp.status));
                }
                Ok(resp)
            }
            Err(e) => {
                if let Some(p) = &self.progress {
                    p.upload_finished("failed");
                }
                Err(TransportError::Network(format!("POST {url}: {e}")))
            }
        }
    }
}

/// Splits `bytes` into a streamed body that reports each chunk as it is
/// pulled by the connection.
fn progress_body(
    bytes: Bytes,
    sink: UnboundedSender<UploadProgress>,
    bar: Option<Arc<Progress>>,
) -> reqwest::Body {
    use futures::StreamExt as _;

    let total = bytes.len() as u64;
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len())))
        .collect();

    let mut loaded = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        loaded += chunk.len() as u64;
        let _ = sink.send(UploadProgress {
            loaded,
            total: Some(total),
        });
        if let Some(bar) = &bar {
            bar.upload_advanced(loaded);
        }
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reusable_field_only_when_checked() {
        let file = SelectedFile::new("a.bin", vec![1u8, 2, 3]);
        let off = UploadForm {
            file: file.clone(),
            reusable: false,
        };
        assert!(off.text_fields().is_empty());
        let on = UploadForm {
            file,
            reusable: true,
        };
        assert_eq!(on.text_fields(), vec![("reusable", "on")]);
    }
}
