use crate::source::EventSource;
use crate::system::SystemError;
use crossterm::event::{
    DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange,
    EventStream, KeyEvent, MouseEvent,
};
use crossterm::{cursor, execute};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, stderr, stdout, Stderr, Stdout, Write};

/// Terminal input delivered through [`terminal_events`].
///
/// Each variant wraps the corresponding [`crossterm::event::Event`] payload,
/// so key codes, modifiers and mouse buttons can be matched with the full
/// crossterm API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// A keyboard event.
    Key(KeyEvent),
    /// A mouse event.
    Mouse(MouseEvent),
    /// Terminal resized to (columns, rows).
    Resize(u16, u16),
    /// Terminal window gained focus.
    FocusGained,
    /// Terminal window lost focus.
    FocusLost,
    /// Bracketed paste content.
    Paste(String),
}

impl From<crossterm::event::Event> for TerminalEvent {
    fn from(event: crossterm::event::Event) -> Self {
        match event {
            crossterm::event::Event::Key(k) => TerminalEvent::Key(k),
            crossterm::event::Event::Mouse(m) => TerminalEvent::Mouse(m),
            crossterm::event::Event::Resize(w, h) => TerminalEvent::Resize(w, h),
            crossterm::event::Event::FocusGained => TerminalEvent::FocusGained,
            crossterm::event::Event::FocusLost => TerminalEvent::FocusLost,
            crossterm::event::Event::Paste(s) => TerminalEvent::Paste(s),
        }
    }
}

/// An [`EventSource`] of terminal input, mapped into module events.
///
/// The `map` closure returns `Some(event)` to forward an input to the system
/// or `None` to discard it. Read errors are skipped.
///
/// # Example
///
/// ```rust,ignore
/// let keys = terminal_events(|input| match input {
///     TerminalEvent::Key(key) if key.code == KeyCode::Char('r') => {
///         Some(BalanceEvent::UserPulledToRefresh)
///     }
///     _ => None,
/// });
/// ```
pub fn terminal_events<E: Send + 'static>(
    map: impl Fn(TerminalEvent) -> Option<E> + Send + 'static,
) -> EventSource<E> {
    // The EventStream is created on first poll, inside the source's task, so
    // building the source does not touch crossterm's global reader.
    let stream = futures::stream::once(async { EventStream::new() })
        .flatten()
        .filter_map(move |result| {
            let event = result.ok().and_then(|event| map(TerminalEvent::from(event)));
            async move { event }
        });
    EventSource::from_stream("terminal", stream)
}

/// Output target for the terminal UI.
///
/// When stdout is piped, switch to [`Stderr`](OutputTarget::Stderr) so the UI
/// goes to the terminal while data flows through the pipe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// Write to stdout (default).
    #[default]
    Stdout,
    /// Write to stderr.
    Stderr,
}

/// The stream a screen draws to.
pub(crate) enum Output {
    Stdout(Stdout),
    Stderr(Stderr),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(w) => w.write(buf),
            Output::Stderr(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(w) => w.flush(),
            Output::Stderr(w) => w.flush(),
        }
    }
}

impl From<OutputTarget> for Output {
    fn from(target: OutputTarget) -> Self {
        match target {
            OutputTarget::Stdout => Output::Stdout(stdout()),
            OutputTarget::Stderr => Output::Stderr(stderr()),
        }
    }
}

/// The terminal-facing subset of [`ScreenOptions`](super::ScreenOptions).
#[derive(Debug, Clone)]
pub(crate) struct TerminalSetup {
    pub alt_screen: bool,
    pub catch_panics: bool,
    pub focus_reporting: bool,
    pub title: Option<String>,
    pub output: OutputTarget,
}

pub(crate) fn init_terminal(
    setup: &TerminalSetup,
) -> Result<Terminal<CrosstermBackend<Output>>, SystemError> {
    // One hook per process, however many screens run.
    static PANIC_HOOK: std::sync::Once = std::sync::Once::new();
    if setup.catch_panics {
        let (alt_screen, output) = (setup.alt_screen, setup.output);
        PANIC_HOOK.call_once(move || {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                let _ = restore_terminal(alt_screen, output);
                previous(info);
            }));
        });
    }

    enable_raw_mode()?;
    let mut writer = Output::from(setup.output);

    if setup.alt_screen {
        execute!(writer, EnterAlternateScreen)?;
    }
    execute!(writer, EnableBracketedPaste)?;
    if setup.focus_reporting {
        execute!(writer, EnableFocusChange)?;
    }
    if let Some(title) = &setup.title {
        execute!(writer, SetTitle(title))?;
    }
    execute!(writer, cursor::Hide)?;

    Ok(Terminal::new(CrosstermBackend::new(writer))?)
}

pub(crate) fn restore_terminal(alt_screen: bool, output: OutputTarget) -> Result<(), io::Error> {
    // Every step runs even if an earlier one failed.
    let raw = disable_raw_mode();
    let mut writer = Output::from(output);
    execute!(writer, DisableBracketedPaste).ok();
    execute!(writer, DisableFocusChange).ok();
    execute!(writer, cursor::Show).ok();
    if alt_screen {
        execute!(writer, LeaveAlternateScreen).ok();
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};

    #[test]
    fn converts_crossterm_events() {
        let key = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE);
        assert_eq!(
            TerminalEvent::from(crossterm::event::Event::Key(key)),
            TerminalEvent::Key(key)
        );
        assert_eq!(
            TerminalEvent::from(crossterm::event::Event::Resize(80, 24)),
            TerminalEvent::Resize(80, 24)
        );
        assert_eq!(
            TerminalEvent::from(crossterm::event::Event::Paste("addr".into())),
            TerminalEvent::Paste("addr".into())
        );
    }

    #[test]
    fn terminal_source_is_named() {
        let source = terminal_events(|_| Some(()));
        assert_eq!(source.name(), "terminal");
    }
}
