use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProgressMode {
    /// Enable progress UI when stderr is a TTY.
    Auto,
    /// Always enable progress UI (even when piped).
    Always,
    /// Never show progress UI.
    Never,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Upload page to load (e.g. `https://files.example.com/upload`).
    #[arg(long)]
    pub page_url: Url,

    /// JSON file holding per-origin preferences (the page's local storage).
    #[arg(long, default_value = "page-enhance-storage.json")]
    pub storage: PathBuf,

    /// Click the theme toggle once after the page is ready.
    #[arg(long)]
    pub toggle_theme: bool,

    /// File to pick into the upload form and submit.
    #[arg(long)]
    pub upload: Option<PathBuf>,

    /// Tick the form's `reusable` checkbox before submitting.
    #[arg(long, requires = "upload")]
    pub reusable: bool,

    /// Where to write the resulting page HTML. Defaults to stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// HTTP User-Agent for page loads and uploads.
    #[arg(long, default_value = "page-enhance/0.1")]
    pub user_agent: String,

    /// Progress display: `auto`, `always`, or `never`.
    #[arg(long, value_enum, default_value = "auto")]
    pub progress: ProgressMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_invocation() {
        let args = Args::try_parse_from([
            "page-enhance",
            "--page-url",
            "http://files.example.com/upload",
            "--upload",
            "notes.txt",
            "--reusable",
            "--progress",
            "never",
        ])
        .unwrap();
        assert_eq!(args.page_url.path(), "/upload");
        assert!(args.reusable);
        assert!(!args.toggle_theme);
        assert_eq!(args.storage, PathBuf::from("page-enhance-storage.json"));
    }

    #[test]
    fn reusable_requires_upload() {
        let res = Args::try_parse_from([
            "page-enhance",
            "--page-url",
            "http://files.example.com/upload",
            "--reusable",
        ]);
        assert!(res.is_err());
    }
}
