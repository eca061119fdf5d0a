//! Asynchronous upload form.
//!
//! Submitting `#uploadForm` sends the picked file as a multipart POST to the
//! form's `action`, mirrors upload progress into the progress widgets, and on
//! success swaps the page's flash list for the one in the response. Exactly
//! one of the success, HTTP-failure and network-failure paths runs per
//! submission.

use tokio::sync::mpsc;
use url::Url;

use crate::dom::{Document, Element};
use crate::env::PageEnv;
use crate::storage::PreferenceStore;
use crate::transport::{Transport, TransportError, UploadForm, UploadProgress};

pub const FORM_ID: &str = "uploadForm";
pub const FILE_INPUT_ID: &str = "fileUpload";
pub const PROGRESS_ID: &str = "uploadProgress";
pub const PROGRESS_CONTAINER_ID: &str = "uploadProgressContainer";
pub const PROGRESS_TEXT_ID: &str = "uploadProgressText";
pub const UPLOAD_BUTTON_ID: &str = "uploadBtn";
pub const REUSABLE_SELECTOR: &str = r#"input[name="reusable"]"#;
pub const FLASHES_SELECTOR: &str = "ul.flashes";
pub const FALLBACK_PATH: &str = "/upload";

pub const PENDING_CLASS: &str = "yellowBtn";
pub const PENDING_LABEL: &str = "· · ·";
pub const IDLE_LABEL: &str = "Upload";
pub const FAILED_MESSAGE: &str = "Upload failed";
pub const ERROR_MESSAGE: &str = "Upload error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashUpdate {
    /// An existing flash list was replaced.
    Replaced,
    /// No flash list was on the page; the new one now opens `<body>`.
    Inserted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Submit with no file picked. Nothing was sent.
    NoFile,
    /// Submit while a previous upload is still running. Nothing was sent.
    AlreadyInFlight,
    Succeeded(FlashUpdate),
    /// Success status, but the response could not be used; a navigation to
    /// the upload page was requested instead.
    Reloaded,
    FailedHttp(u16),
    FailedNetwork,
}

/// `round(loaded / total * 100)`, clamped to `0..=100`. `None` when the total
/// is unknown or zero.
pub fn percent(progress: UploadProgress) -> Option<u8> {
    let total = u128::from(progress.total.filter(|t| *t > 0)?);
    let loaded = u128::from(progress.loaded).min(total);
    let rounded = (loaded * 200 + total) / (total * 2);
    Some(rounded.min(100) as u8)
}

/// The reusable checkbox inside `#uploadForm`. One elsewhere on the page is
/// not part of the submission.
pub fn reusable_checkbox(doc: &Document) -> Option<Element> {
    doc.get_element_by_id(FORM_ID)?.query_selector(REUSABLE_SELECTOR)
}

/// Result of the synchronous part of a submit.
pub enum Submission {
    Send(PendingUpload),
    Skip(UploadOutcome),
}

/// A submission that passed the submit handler and still has to be sent.
pub struct PendingUpload {
    action: Option<String>,
    form: UploadForm,
    reusable: Option<Element>,
}

pub struct UploadController {
    form: Element,
    file_input: Option<Element>,
    progress: Option<Element>,
    container: Option<Element>,
    text: Option<Element>,
    button: Option<Element>,
}

impl UploadController {
    /// Returns `None` when the page has no upload form.
    pub fn attach<S: PreferenceStore>(env: &PageEnv<S>) -> Option<Self> {
        let doc = &env.document;
        let form = doc.get_element_by_id(FORM_ID)?;
        Some(Self {
            form,
            file_input: doc.get_element_by_id(FILE_INPUT_ID),
            progress: doc.get_element_by_id(PROGRESS_ID),
            container: doc.get_element_by_id(PROGRESS_CONTAINER_ID),
            text: doc.get_element_by_id(PROGRESS_TEXT_ID),
            button: doc.get_element_by_id(UPLOAD_BUTTON_ID),
        })
    }

    /// Submit handler: collects the payload and locks the submit button.
    ///
    /// The button is disabled here rather than on the first progress event,
    /// so a second submit cannot slip in before bytes start moving.
    pub fn begin<S: PreferenceStore>(&self, env: &PageEnv<S>) -> Submission {
        if self.file_input.is_none() {
            tracing::debug!("upload form has no file input; ignoring submit");
            return Submission::Skip(UploadOutcome::NoFile);
        }
        let Some(file) = env.selected_files(FILE_INPUT_ID).first().cloned() else {
            tracing::debug!("submit without a file; ignoring");
            return Submission::Skip(UploadOutcome::NoFile);
        };
        if let Some(button) = &self.button {
            if button.is_disabled() {
                tracing::warn!(file = %file.name, "upload already in flight; ignoring submit");
                return Submission::Skip(UploadOutcome::AlreadyInFlight);
            }
            button.set_disabled(true);
        }

        let reusable = self.form.query_selector(REUSABLE_SELECTOR);
        let form = UploadForm {
            file,
            reusable: reusable.as_ref().is_some_and(Element::is_checked),
        };
        Submission::Send(PendingUpload {
            action: self.form.attr("action"),
            form,
            reusable,
        })
    }

    /// Runs the request, applying progress as it arrives, then settles the
    /// page through exactly one completion path.
    pub async fn send<S: PreferenceStore, T: Transport>(
        &self,
        env: &mut PageEnv<S>,
        transport: &T,
        pending: PendingUpload,
    ) -> UploadOutcome {
        let PendingUpload {
            action,
            form,
            reusable,
        } = pending;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = match resolve_action(env.location(), action.as_deref()) {
            Ok(url) => {
                tracing::info!(%url, file = %form.file.name, reusable = form.reusable, "uploading");
                let request = transport.post_multipart(&url, form, tx);
                let mut request = std::pin::pin!(request);
                loop {
                    tokio::select! {
                        biased;
                        Some(p) = rx.recv() => {
                            self.on_progress(p);
                        }
                        result = &mut request => break result,
                    }
                }
            }
            Err(e) => Err(TransportError::Request(format!("{e:#}"))),
        };
        while let Ok(p) = rx.try_recv() {
            self.on_progress(p);
        }

        match result {
            Ok(resp) if (200..400).contains(&resp.status) => {
                self.on_success(env, &resp.body, reusable.as_ref())
            }
            Ok(resp) => self.on_http_failure(env, resp.status),
            Err(e) => self.on_network_failure(env, &e),
        }
    }

    pub async fn submit<S: PreferenceStore, T: Transport>(
        &self,
        env: &mut PageEnv<S>,
        transport: &T,
    ) -> UploadOutcome {
        match self.begin(env) {
            Submission::Send(pending) => self.send(env, transport, pending).await,
            Submission::Skip(outcome) => outcome,
        }
    }

    /// Returns the percentage shown, if the event carried a usable total.
    pub fn on_progress(&self, progress: UploadProgress) -> Option<u8> {
        let percent = percent(progress)?;
        let label = format!("{percent}%");

        if let Some(bar) = &self.progress {
            match &self.container {
                Some(container) => container.set_display("block"),
                None => bar.set_display("block"),
            }
            bar.set_style_property("width", &label);
            bar.set_attr("aria-valuenow", percent.to_string());
            bar.set_text(&label);
        }
        if let Some(text) = &self.text {
            text.set_display("block");
            text.set_text(&label);
        }
        if let Some(button) = &self.button {
            button.add_class(PENDING_CLASS);
            button.set_value(PENDING_LABEL);
            button.set_disabled(true);
        }
        Some(percent)
    }

    fn on_success<S: PreferenceStore>(
        &self,
        env: &mut PageEnv<S>,
        body: &str,
        reusable: Option<&Element>,
    ) -> UploadOutcome {
        let outcome = match swap_flashes(&env.document, body) {
            Ok(Some(update)) => {
                tracing::info!(?update, "flash messages refreshed");
                UploadOutcome::Succeeded(update)
            }
            Ok(None) => {
                tracing::warn!("upload response has no flash list; reloading upload page");
                self.reload(env)
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "cannot apply upload response; reloading upload page");
                self.reload(env)
            }
        };

        self.reset_button();
        self.reset_progress();
        if let Some(text) = &self.text {
            text.set_display("none");
            text.set_text("0%");
        }
        env.clear_files(FILE_INPUT_ID);
        if let Some(reusable) = reusable {
            if reusable.is_checked() {
                reusable.set_checked(false);
            }
        }
        outcome
    }

    fn on_http_failure<S: PreferenceStore>(&self, env: &mut PageEnv<S>, status: u16) -> UploadOutcome {
        tracing::warn!(status, "upload rejected");
        self.settle_failed(env, FAILED_MESSAGE);
        UploadOutcome::FailedHttp(status)
    }

    fn on_network_failure<S: PreferenceStore>(
        &self,
        env: &mut PageEnv<S>,
        error: &TransportError,
    ) -> UploadOutcome {
        tracing::warn!(%error, "upload did not complete");
        self.settle_failed(env, ERROR_MESSAGE);
        UploadOutcome::FailedNetwork
    }

    fn settle_failed<S: PreferenceStore>(&self, env: &mut PageEnv<S>, message: &str) {
        if let Some(text) = &self.text {
            text.set_text(message);
        }
        self.reset_button();
        env.clear_files(FILE_INPUT_ID);
        self.reset_progress();
        if let Some(text) = &self.text {
            text.set_display("none");
        }
    }

    fn reload<S: PreferenceStore>(&self, env: &mut PageEnv<S>) -> UploadOutcome {
        if let Err(e) = env.navigate(FALLBACK_PATH) {
            tracing::warn!(error = %e, "cannot resolve fallback navigation");
        }
        UploadOutcome::Reloaded
    }

    fn reset_button(&self) {
        if let Some(button) = &self.button {
            button.set_disabled(false);
            button.remove_class(PENDING_CLASS);
            button.set_value(IDLE_LABEL);
        }
    }

    fn reset_progress(&self) {
        if let Some(bar) = &self.progress {
            match &self.container {
                Some(container) => container.set_display("none"),
                None => bar.set_display("none"),
            }
            bar.set_style_property("width", "0%");
            bar.set_attr("aria-valuenow", "0");
            bar.set_text("0%");
        }
    }
}

fn resolve_action(location: &Url, action: Option<&str>) -> anyhow::Result<Url> {
    match action.map(str::trim) {
        Some(action) if !action.is_empty() => Ok(location.join(action)?),
        _ => Ok(location.clone()),
    }
}

/// Moves the response's flash list into `doc`. `Ok(None)` when the response
/// has none.
fn swap_flashes(doc: &Document, body: &str) -> anyhow::Result<Option<FlashUpdate>> {
    let response = Document::parse(body);
    let Some(fresh) = response.query_selector(FLASHES_SELECTOR) else {
        return Ok(None);
    };
    let fresh = fresh.node().clone();
    fresh.detach();

    match doc.query_selector(FLASHES_SELECTOR) {
        Some(current) => {
            current.replace_with(fresh);
            Ok(Some(FlashUpdate::Replaced))
        }
        None => {
            doc.body()?.prepend(fresh);
            Ok(Some(FlashUpdate::Inserted))
        }
    }
}
