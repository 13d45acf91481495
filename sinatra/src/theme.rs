use crate::mirror::{Key, Mirror};
use std::{fmt, rc::Rc, str::FromStr};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggle(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Root CSS custom properties for this theme.
    pub fn css_vars(&self) -> [(&'static str, &'static str); 2] {
        match self {
            Theme::Light => [("--bg", "#ffffff"), ("--text", "#000000")],
            Theme::Dark => [("--bg", "#000000"), ("--text", "#ffffff")],
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(format!("unknown theme {s}")),
        }
    }
}

/// The saved theme preference. It lives in the preference scope of the
/// mirror, so logging out keeps it.
pub struct ThemeStore {
    mirror: Rc<Mirror>,
}

impl ThemeStore {
    pub fn new(mirror: Rc<Mirror>) -> ThemeStore {
        ThemeStore { mirror }
    }

    /// Anything other than `light` or `dark` counts as no preference.
    pub fn saved(&self) -> Option<Theme> {
        self.mirror.read_raw(&Key::Theme)?.parse().ok()
    }

    /// The saved preference, else the system one.
    pub fn resolve(&self, prefers_dark: bool) -> Theme {
        self.saved().unwrap_or(if prefers_dark {
            Theme::Dark
        } else {
            Theme::Light
        })
    }

    /// Whether a system theme change should be applied.
    pub fn follows_system(&self) -> bool {
        self.saved().is_none()
    }

    pub fn set(&self, theme: Theme) {
        debug!(%theme, "saving theme");
        self.mirror.write_raw(&Key::Theme, theme.as_str());
    }

    pub fn toggle(&self, current: Theme) -> Theme {
        let theme = current.toggle();
        self.set(theme);
        theme
    }
}
