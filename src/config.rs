//! Code for storing and parsing tapedeck configuration data.

use std::{fs, io::ErrorKind, path::Path, str::FromStr};

use directories::ProjectDirs;
use eyre::{ensure, eyre, Context, Result};
use ratatui::style::Color;

/// The parsed version of a `config.toml` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub player: PlayerSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    /// How far back the rewind control jumps, in seconds.
    pub rewind_seconds: u64,
    /// How far the left/right keys scrub, in seconds.
    pub scrub_seconds: u64,
    /// Audio to load when the queue is empty. Empty means load nothing.
    pub placeholder_uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiSettings {
    /// Don't render the queue position at all (it doesn't take up space either).
    pub hide_queue: bool,
    /// Don't render the description at all.
    pub hide_description: bool,
    /// Maximum number of lines the description wraps onto.
    pub description_lines: u16,
    pub style: StyleSettings,
}

/// Overrides for the built-in look. Anything not set in the file keeps its default.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSettings {
    pub background: Color,
    pub foreground: Color,
    pub accent: Color,
    /// Blank cells between the border and the content.
    pub padding: u16,
}

impl Settings {
    fn from_raw(raw: raw::Config) -> Result<Settings> {
        ensure!(raw.player.rewind_seconds >= 1, "player.rewind-seconds must be at least 1");
        ensure!(raw.ui.description_lines >= 1, "ui.description-lines must be at least 1");
        Ok(Settings {
            player: PlayerSettings {
                rewind_seconds: raw.player.rewind_seconds,
                scrub_seconds: raw.player.scrub_seconds,
                placeholder_uri: raw.player.placeholder_uri,
            },
            ui: UiSettings {
                hide_queue: raw.ui.hide_queue,
                hide_description: raw.ui.hide_description,
                description_lines: raw.ui.description_lines,
                style: StyleSettings::from_raw(raw.ui.style)?,
            },
        })
    }

    /// Loads settings from `path`. A missing file just means the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => contents
                .parse()
                .wrap_err_with(|| format!("invalid config file {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).wrap_err_with(|| format!("couldn't read {}", path.display())),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        "".parse().expect("the empty config is valid")
    }
}

impl FromStr for Settings {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: raw::Config = toml::from_str(s)?;
        Settings::from_raw(raw)
    }
}

impl StyleSettings {
    fn from_raw(raw: raw::Style) -> Result<StyleSettings> {
        Ok(StyleSettings {
            background: parse_color(&raw.background)?,
            foreground: parse_color(&raw.foreground)?,
            accent: parse_color(&raw.accent)?,
            padding: raw.padding,
        })
    }
}

fn parse_color(s: &str) -> Result<Color> {
    Color::from_str(s).map_err(|_| eyre!("{s:?} is not a color"))
}

/// Where tapedeck keeps its files. `None` if we can't figure out a home directory.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("ai", "ext0l", "tapedeck")
}

/// A low-level description of the configuration file. `raw::Config` is transformed into
/// `Settings`.
mod raw {
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "kebab-case", deny_unknown_fields)]
    pub(super) struct Config {
        #[serde(default)]
        pub player: Player,
        #[serde(default)]
        pub ui: Ui,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub(super) struct Player {
        pub rewind_seconds: u64,
        pub scrub_seconds: u64,
        pub placeholder_uri: String,
    }

    impl Default for Player {
        fn default() -> Self {
            Self { rewind_seconds: 10, scrub_seconds: 5, placeholder_uri: String::new() }
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub(super) struct Ui {
        pub hide_queue: bool,
        pub hide_description: bool,
        pub description_lines: u16,
        pub style: Style,
    }

    impl Default for Ui {
        fn default() -> Self {
            Self {
                hide_queue: false,
                hide_description: false,
                description_lines: 2,
                style: Style::default(),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub(super) struct Style {
        pub background: String,
        pub foreground: String,
        pub accent: String,
        pub padding: u16,
    }

    impl Default for Style {
        fn default() -> Self {
            Self {
                background: "#1a1a1a".into(),
                foreground: "white".into(),
                accent: "lightcyan".into(),
                padding: 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_valid() {
        let settings = "".parse::<Settings>().unwrap();
        assert_eq!(settings.player.rewind_seconds, 10);
        assert_eq!(settings.player.scrub_seconds, 5);
        assert!(!settings.ui.hide_queue);
        assert!(!settings.ui.hide_description);
        assert_eq!(settings.ui.description_lines, 2);
    }

    #[test]
    fn empty_tables_are_valid() {
        r#"
[player]
[ui]
[ui.style]
"#
        .parse::<Settings>()
        .unwrap();
    }

    #[test]
    fn style_merges_with_defaults() {
        let settings: Settings = r#"
[ui.style]
accent = "magenta"
"#
        .parse()
        .unwrap();
        assert_eq!(settings.ui.style.accent, Color::Magenta);
        assert_eq!(settings.ui.style.foreground, Color::White);
        assert_eq!(settings.ui.style.background, Color::Rgb(0x1a, 0x1a, 0x1a));
    }

    #[test]
    fn hide_flags_are_read() {
        let settings: Settings = r#"
[ui]
hide-queue = true
hide-description = true
"#
        .parse()
        .unwrap();
        assert!(settings.ui.hide_queue);
        assert!(settings.ui.hide_description);
    }

    #[test]
    fn bad_color_is_an_error() {
        assert!(r#"
[ui.style]
background = "not a color"
"#
        .parse::<Settings>()
        .is_err());
    }

    #[test]
    fn zero_rewind_is_an_error() {
        assert!("[player]\nrewind-seconds = 0".parse::<Settings>().is_err());
    }

    #[test]
    fn unknown_keys_are_an_error() {
        assert!("[player]\nrewnid-seconds = 3".parse::<Settings>().is_err());
    }

    #[test]
    fn missing_file_means_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(Settings::load(dir.path().join("config.toml"))?, Settings::default());
        Ok(())
    }
}
