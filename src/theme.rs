//! Light/dark theme preference.
//!
//! The preference lives in origin storage under [`STORAGE_KEY`]. Dark mode is
//! the `dark-mode` class on `<body>`; the toggle button shows a sun while dark
//! and the authored moon while light.

use maud::html;

use crate::dom::Element;
use crate::env::PageEnv;
use crate::storage::PreferenceStore;

pub const STORAGE_KEY: &str = "theme";
pub const TOGGLE_ID: &str = "themeToggle";
pub const DARK_CLASS: &str = "dark-mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    /// Anything but `"dark"`, including nothing, reads as light.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("dark") => Theme::Dark,
            _ => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Icon offering the other mode.
    fn icon_class(self) -> &'static str {
        match self {
            Theme::Light => "fas fa-moon",
            Theme::Dark => "fas fa-sun",
        }
    }
}

fn icon_markup(theme: Theme) -> String {
    html! { i class=(theme.icon_class()) {} }.into_string()
}

pub struct ThemeController {
    toggle: Element,
}

impl ThemeController {
    /// Applies the stored preference and returns a controller when the
    /// toggle control exists.
    pub fn init<S: PreferenceStore>(env: &PageEnv<S>) -> Option<Self> {
        let stored = env.storage.get_item(STORAGE_KEY);
        let theme = Theme::from_stored(stored.as_deref());
        let toggle = env.document.get_element_by_id(TOGGLE_ID);

        if theme == Theme::Dark {
            match env.document.body() {
                Ok(body) => body.add_class(DARK_CLASS),
                Err(e) => tracing::warn!(error = %e, "cannot apply dark mode"),
            }
            if let Some(toggle) = &toggle {
                toggle.set_inner_html(&icon_markup(Theme::Dark));
            }
        }
        tracing::debug!(theme = theme.as_str(), toggle = toggle.is_some(), "theme applied");

        toggle.map(|toggle| Self { toggle })
    }

    pub fn on_click<S: PreferenceStore>(&self, env: &mut PageEnv<S>) -> anyhow::Result<Theme> {
        let body = env.document.body()?;
        let theme = if body.toggle_class(DARK_CLASS) {
            Theme::Dark
        } else {
            Theme::Light
        };
        self.toggle.set_inner_html(&icon_markup(theme));

        if let Err(e) = env.storage.set_item(STORAGE_KEY, theme.as_str()) {
            tracing::warn!(error = %format!("{e:#}"), "failed to persist theme preference");
        }
        tracing::info!(theme = theme.as_str(), "theme toggled");
        Ok(theme)
    }
}
