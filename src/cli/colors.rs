use std::io::IsTerminal;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream};

/// Create a StandardStream with appropriate color support
///
/// With `auto`, colors are dropped when stdout is not a terminal; termcolor
/// itself also honors NO_COLOR in that mode.
pub fn create_stdout(preference: ColorChoice) -> StandardStream {
    let choice = if preference == ColorChoice::Auto && !std::io::stdout().is_terminal() {
        ColorChoice::Never
    } else {
        preference
    };
    StandardStream::stdout(choice)
}

/// Failures and missing link targets: red + bold
pub fn error() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(Color::Red)).set_bold(true);
    spec
}

/// Placeholders and soft problems: yellow + bold
pub fn warning() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(Color::Yellow)).set_bold(true);
    spec
}

pub fn success() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(Color::Green));
    spec
}

/// Note titles and headers: cyan
pub fn highlight() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(Color::Cyan));
    spec
}

/// `#tags`: magenta
pub fn tag() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(Color::Magenta));
    spec
}

/// Paths, counts and other secondary info
pub fn dim() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_dimmed(true);
    spec
}
