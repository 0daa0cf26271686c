//! Styling of command output

use std::{fmt::Display, sync::OnceLock, time::Duration};

use owo_colors::{OwoColorize, Style};

/// The roles text plays in command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Every code resolved, nothing to report.
    Success,
    /// A cluster dropped codes or has unknown parents.
    Warning,
    /// The history table is broken, for example a replacement cycle.
    Error,
    /// Rules, column headings and file locations.
    Muted,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Success => Style::new().green(),
            Self::Warning => Style::new().yellow(),
            Self::Error => Style::new().red().bold(),
            Self::Muted => Style::new().dimmed(),
        }
    }

    /// Renders `text` in this tone, or plainly when `color` is off.
    pub fn paint(self, text: &(impl Display + ?Sized), color: bool) -> String {
        if color {
            text.style(self.style()).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Whether stdout takes ANSI colours. Detected once per run.
fn color_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| supports_color::on(supports_color::Stream::Stdout).is_some())
}

/// Whether the terminal is too narrow for the full cluster table.
pub fn is_narrow() -> bool {
    terminal_size::terminal_size().is_some_and(|(width, _)| width.0 < 60)
}

/// Formats a run duration as minutes and seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    if minutes > 0 {
        format!("{minutes} minutes and {seconds} seconds")
    } else {
        format!("{seconds} seconds")
    }
}

/// Tone shorthands for anything printable.
pub trait Colorize: Display {
    /// Renders in the given tone when stdout supports colour.
    fn tone(&self, tone: Tone) -> String {
        tone.paint(self, color_enabled())
    }

    /// See [`Tone::Success`].
    fn success(&self) -> String {
        self.tone(Tone::Success)
    }

    /// See [`Tone::Warning`].
    fn warning(&self) -> String {
        self.tone(Tone::Warning)
    }

    /// See [`Tone::Error`].
    fn error(&self) -> String {
        self.tone(Tone::Error)
    }

    /// See [`Tone::Muted`].
    fn dim(&self) -> String {
        self.tone(Tone::Muted)
    }
}

impl<T: Display + ?Sized> Colorize for T {}
