//! Terminal UI binding.
//!
//! The view side of a system only ever reads state. A [`View`] renders a
//! state snapshot into a ratatui frame, [`terminal_events`] turns terminal
//! input into module events, and [`Screen`] wires the two to a running
//! [`System`] on a real terminal.

mod terminal;

pub use terminal::{terminal_events, OutputTarget, TerminalEvent};

use crate::reducer::Reducer;
use crate::system::{System, SystemError};
use ratatui::layout::Rect;
use ratatui::Frame;
use std::time::Duration;
use terminal::{init_terminal, restore_terminal, TerminalSetup};
use tokio::time::MissedTickBehavior;

/// Renders a read-only state snapshot into an area of a frame.
///
/// Views never mutate state and never talk to the system; anything the user
/// does comes back in through an [`EventSource`](crate::EventSource).
pub trait View<S>: Send + 'static {
    /// Draw `state` into `area`.
    fn render(&self, state: &S, frame: &mut Frame, area: Rect);
}

/// Configuration options for a [`Screen`].
///
/// All fields have sensible defaults (see the [`Default`] impl).
#[derive(Debug, Clone)]
pub struct ScreenOptions {
    /// Maximum redraws per second (default: 30, clamped to 1..=120).
    pub fps: u32,
    /// Render in the alternate screen (default: true).
    pub alt_screen: bool,
    /// Restore the terminal before a panic message is printed (default: true).
    pub catch_panics: bool,
    /// Shut down on Ctrl+C delivered as a signal (default: true).
    pub handle_signals: bool,
    /// Enable focus-in/focus-out reporting.
    pub focus_reporting: bool,
    /// Set the terminal title.
    pub title: Option<String>,
    /// Output target: stdout (default) or stderr.
    pub output: OutputTarget,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            alt_screen: true,
            catch_panics: true,
            handle_signals: true,
            focus_reporting: false,
            title: None,
            output: OutputTarget::default(),
        }
    }
}

impl ScreenOptions {
    fn setup(&self) -> TerminalSetup {
        TerminalSetup {
            alt_screen: self.alt_screen,
            catch_panics: self.catch_panics,
            focus_reporting: self.focus_reporting,
            title: self.title.clone(),
            output: self.output,
        }
    }
}

/// Binds a [`System`] to the terminal.
///
/// The screen drives the system on its own task, redraws whenever a new state
/// arrives (at most `fps` times per second) and restores the terminal when
/// the system stops.
///
/// # Example
///
/// ```rust,ignore
/// let system = System::<TradingReducer>::new(TradingState::new(pair))
///     .with_feedback(trading::order_book(feed))
///     .with_source(terminal_events(keymap));
///
/// let final_state = Screen::new(system, TradingView)
///     .exit_when(|s: &TradingState| s.closed)
///     .run()
///     .await?;
/// ```
pub struct Screen<R: Reducer, V> {
    system: System<R>,
    view: V,
    options: ScreenOptions,
    #[allow(clippy::type_complexity)]
    exit_when: Option<Box<dyn Fn(&R::State) -> bool + Send>>,
}

impl<R: Reducer, V: View<R::State>> Screen<R, V> {
    /// Create a screen for `system`, rendered by `view`, with default options.
    pub fn new(system: System<R>, view: V) -> Self {
        Self {
            system,
            view,
            options: ScreenOptions::default(),
            exit_when: None,
        }
    }

    /// Replace the default options.
    pub fn with_options(mut self, options: ScreenOptions) -> Self {
        self.options = options;
        self
    }

    /// Shut the system down once a state satisfies `predicate`.
    pub fn exit_when(mut self, predicate: impl Fn(&R::State) -> bool + Send + 'static) -> Self {
        self.exit_when = Some(Box::new(predicate));
        self
    }

    /// Run until the system stops, then return its final state.
    pub async fn run(self) -> Result<R::State, SystemError> {
        let Screen {
            system,
            view,
            options,
            exit_when,
        } = self;

        let handle = system.handle();
        let mut states = handle.state.clone();
        let driver = tokio::spawn(system.run());

        let mut terminal = init_terminal(&options.setup())?;
        let fps = options.fps.clamp(1, 120);
        let mut frame_interval = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut needs_redraw = true;
        let result = loop {
            tokio::select! {
                biased;

                _ = tokio::signal::ctrl_c(), if options.handle_signals => {
                    tracing::debug!("received ctrl+c signal");
                    handle.shutdown();
                }

                changed = states.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    needs_redraw = true;
                    let done = exit_when
                        .as_ref()
                        .is_some_and(|exit| exit(&*states.borrow_and_update()));
                    if done {
                        handle.shutdown();
                    }
                }

                _ = frame_interval.tick() => {
                    if needs_redraw {
                        let state = states.borrow_and_update().clone();
                        if let Err(err) = terminal.draw(|frame| {
                            let area = frame.area();
                            view.render(&state, frame, area);
                        }) {
                            handle.shutdown();
                            break Err(SystemError::Io(err));
                        }
                        needs_redraw = false;
                    }
                }
            }
        };

        restore_terminal(options.alt_screen, options.output)?;
        let final_state = driver.await.map_err(|_| SystemError::Stopped)?;
        result.map(|()| final_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::render_string;
    use ratatui::widgets::Paragraph;

    struct CountView;

    impl View<u32> for CountView {
        fn render(&self, count: &u32, frame: &mut Frame, area: Rect) {
            frame.render_widget(Paragraph::new(format!("Count: {count}")), area);
        }
    }

    #[test]
    fn view_renders_state() {
        let content = render_string(&CountView, &7u32, 20, 1);
        assert!(content.contains("Count: 7"));
    }

    #[test]
    fn screen_options_defaults() {
        let options = ScreenOptions::default();
        assert_eq!(options.fps, 30);
        assert!(options.alt_screen);
        assert_eq!(options.output, OutputTarget::Stdout);
    }
}
