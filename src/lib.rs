mod cli;
pub mod dom;
pub mod env;
pub mod events;
mod progress;
pub mod storage;
pub mod theme;
pub mod transport;
pub mod upload;

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use cli::Args;
use env::{PageEnv, SelectedFile};
use events::{Dispatched, Enhancer, Event};
use storage::JsonFileStore;
use transport::HttpTransport;

pub use cli::ProgressMode;
pub use cli::Args as CliArgs;
pub use progress::Progress;

pub async fn run(args: Args) -> anyhow::Result<()> {
    use std::io::IsTerminal as _;

    let progress_enabled = match args.progress {
        ProgressMode::Always => true,
        ProgressMode::Never => false,
        ProgressMode::Auto => std::io::stderr().is_terminal(),
    };
    let progress = Progress::new(progress_enabled);
    let transport = HttpTransport::new(&args.user_agent, Some(progress.clone()))?;

    let res = drive(&args, &transport, &progress).await;
    progress.finish();
    res
}

async fn drive(
    args: &Args,
    transport: &HttpTransport,
    progress: &Arc<Progress>,
) -> anyhow::Result<()> {
    progress.set_stage("loading page");
    let (location, html) = transport
        .get_page(&args.page_url)
        .await
        .context("load upload page")?;
    let storage = JsonFileStore::open(&args.storage, &location)?;
    let mut env = PageEnv::new(&html, location, storage);
    let enhancer = Enhancer::ready(&env);

    if args.toggle_theme {
        let mut click = Event::click(theme::TOGGLE_ID);
        match enhancer.dispatch(&mut env, transport, &mut click).await? {
            Dispatched::Theme(theme) => {
                tracing::info!(theme = theme.as_str(), "theme preference saved")
            }
            _ => tracing::warn!("page has no theme toggle"),
        }
    }

    if let Some(path) = &args.upload {
        let file = SelectedFile::read(path)?;
        if !env.select_files(upload::FILE_INPUT_ID, vec![file]) {
            tracing::warn!("page has no file input; the upload form will ignore the submit");
        }
        if args.reusable {
            match upload::reusable_checkbox(&env.document) {
                Some(checkbox) => checkbox.set_checked(true),
                None => tracing::warn!("page has no reusable checkbox; uploading as single-use"),
            }
        }

        progress.set_stage("submitting upload form");
        let mut submit = Event::submit(upload::FORM_ID);
        match enhancer.dispatch(&mut env, transport, &mut submit).await? {
            Dispatched::Upload(outcome) => tracing::info!(?outcome, "upload settled"),
            _ => anyhow::bail!("page at {} has no upload form", env.location()),
        }
    }

    if let Some(url) = env.take_navigation() {
        progress.set_stage("following navigation");
        let (location, html) = transport
            .get_page(&url)
            .await
            .with_context(|| format!("navigate to {url}"))?;
        let storage = env.into_storage();
        let storage = if storage.origin() == location.origin().ascii_serialization() {
            storage
        } else {
            JsonFileStore::open(storage.path(), &location)?
        };
        env = PageEnv::new(&html, location, storage);
        Enhancer::ready(&env);
    }

    progress.set_stage("writing output");
    let html = env.document.to_html()?;
    match &args.out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
            }
            std::fs::write(out, html).with_context(|| format!("write {}", out.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(html.as_bytes())
                .context("write page to stdout")?;
            stdout.flush().context("flush stdout")?;
        }
    }
    Ok(())
}
