use crate::env::PageEnv;
use crate::storage::PreferenceStore;
use crate::theme::{self, Theme, ThemeController};
use crate::transport::Transport;
use crate::upload::{self, UploadController, UploadOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Click,
    Submit,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventType,
    pub target: String,
    default_prevented: bool,
}

impl Event {
    pub fn click(target: &str) -> Self {
        Self::new(EventType::Click, target)
    }

    pub fn submit(target: &str) -> Self {
        Self::new(EventType::Submit, target)
    }

    fn new(kind: EventType, target: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// A handler registered at page-ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub kind: EventType,
    pub target: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Unhandled,
    Theme(Theme),
    Upload(UploadOutcome),
}

/// Both page behaviors, attached once when the document is ready.
pub struct Enhancer {
    theme: Option<ThemeController>,
    upload: Option<UploadController>,
    listeners: Vec<Listener>,
}

impl Enhancer {
    /// The `DOMContentLoaded` step: applies the stored theme and registers
    /// handlers for the controls present on the page.
    pub fn ready<S: PreferenceStore>(env: &PageEnv<S>) -> Self {
        let theme = ThemeController::init(env);
        let upload = UploadController::attach(env);

        let mut listeners = Vec::new();
        if theme.is_some() {
            listeners.push(Listener {
                kind: EventType::Click,
                target: theme::TOGGLE_ID,
                name: "toggle-theme",
            });
        }
        if upload.is_some() {
            listeners.push(Listener {
                kind: EventType::Submit,
                target: upload::FORM_ID,
                name: "upload-file",
            });
        }
        tracing::debug!(
            listeners = ?listeners.iter().map(|l| l.name).collect::<Vec<_>>(),
            "page ready"
        );

        Self {
            theme,
            upload,
            listeners,
        }
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub async fn dispatch<S: PreferenceStore, T: Transport>(
        &self,
        env: &mut PageEnv<S>,
        transport: &T,
        event: &mut Event,
    ) -> anyhow::Result<Dispatched> {
        let Some(listener) = self
            .listeners
            .iter()
            .find(|l| l.kind == event.kind && l.target == event.target)
        else {
            tracing::debug!(kind = ?event.kind, target = %event.target, "no listener");
            return Ok(Dispatched::Unhandled);
        };
        tracing::debug!(handler = listener.name, "dispatching");

        match (event.kind, &self.theme, &self.upload) {
            (EventType::Click, Some(theme), _) => Ok(Dispatched::Theme(theme.on_click(env)?)),
            (EventType::Submit, _, Some(upload)) => {
                event.prevent_default();
                Ok(Dispatched::Upload(upload.submit(env, transport).await))
            }
            _ => Ok(Dispatched::Unhandled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::{TransportError, UploadForm, UploadProgress, UploadResponse};
    use tokio::sync::mpsc::UnboundedSender;
    use url::Url;

    struct Unreachable;

    impl Transport for Unreachable {
        async fn post_multipart(
            &self,
            _url: &Url,
            _form: UploadForm,
            _progress: UnboundedSender<UploadProgress>,
        ) -> Result<UploadResponse, TransportError> {
            Err(TransportError::Network("offline".to_string()))
        }
    }

    fn env(html: &str) -> PageEnv<MemoryStore> {
        let url = Url::parse("http://files.example.com/upload").unwrap();
        PageEnv::new(html, url, MemoryStore::new())
    }

    #[test]
    fn registers_only_present_controls() {
        let bare = Enhancer::ready(&env("<body></body>"));
        assert!(bare.listeners().is_empty());

        let full = Enhancer::ready(&env(
            r#"<body><button id="themeToggle"></button><form id="uploadForm"></form></body>"#,
        ));
        let names: Vec<_> = full.listeners().iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["toggle-theme", "upload-file"]);
    }

    #[tokio::test]
    async fn dispatch_routes_by_type_and_target() {
        let mut env = env(
            r#"<body><button id="themeToggle"></button><form id="uploadForm"><input id="fileUpload" type="file"></form></body>"#,
        );
        let enhancer = Enhancer::ready(&env);

        let mut click = Event::click(theme::TOGGLE_ID);
        let got = enhancer.dispatch(&mut env, &Unreachable, &mut click).await.unwrap();
        assert_eq!(got, Dispatched::Theme(Theme::Dark));
        assert!(!click.default_prevented());

        let mut submit = Event::submit(upload::FORM_ID);
        let got = enhancer.dispatch(&mut env, &Unreachable, &mut submit).await.unwrap();
        assert_eq!(got, Dispatched::Upload(UploadOutcome::NoFile));
        assert!(submit.default_prevented());

        let mut stray = Event::click(upload::FORM_ID);
        let got = enhancer.dispatch(&mut env, &Unreachable, &mut stray).await.unwrap();
        assert_eq!(got, Dispatched::Unhandled);
    }

    #[tokio::test]
    async fn submit_without_form_is_not_prevented() {
        let mut env = env("<body><p>plain</p></body>");
        let enhancer = Enhancer::ready(&env);
        let mut submit = Event::submit(upload::FORM_ID);
        let got = enhancer.dispatch(&mut env, &Unreachable, &mut submit).await.unwrap();
        assert_eq!(got, Dispatched::Unhandled);
        assert!(!submit.default_prevented());
    }
}
