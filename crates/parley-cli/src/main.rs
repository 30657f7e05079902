//! Parley CLI - terminal chat client.
//!
//! This is the entry point for the `parley` binary.

mod app;
mod markdown;
mod ui;

use std::io;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use futures::{Stream, StreamExt};
use ratatui::Terminal;
use tokio::sync::mpsc;

use parley_core::ConversationId;
use parley_session::local::{ChannelNavigator, MemoryConversations, ScriptedAssistant};
use parley_session::{
    Collaborators, ControllerConfig, FlashCardFlags, HttpAssistantStream, HttpConversationStore,
    ViewModel,
};
use parley_store::{DurableStore, MemoryStore, RocksStore};

use app::{App, IDLE_TICK, STREAMING_TICK};

/// Parley CLI - chat with the assistant from a terminal.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Conversation store URL.
    #[arg(long, env = "PARLEY_STORE_URL", default_value = "http://localhost:9000")]
    store_url: String,

    /// Streaming relay URL.
    #[arg(long, env = "PARLEY_RELAY_URL", default_value = "http://localhost:8080")]
    relay_url: String,

    /// Model requested for new conversations.
    #[arg(long, env = "PARLEY_MODEL", default_value = "default")]
    model: String,

    /// Directory for pending intents; kept in memory when unset.
    #[arg(long, env = "PARLEY_DATA_DIR")]
    data_dir: Option<String>,

    /// Open an existing conversation.
    #[arg(long)]
    conversation: Option<ConversationId>,

    /// JSON object forwarded with every message as flash-card flags.
    #[arg(long)]
    flags: Option<String>,

    /// Run against an in-process echo assistant.
    #[arg(long, default_value = "false")]
    offline: bool,

    /// Write debug logs to `parley.log`.
    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // The terminal is ours, so logs go to a file.
    if args.debug {
        let file = std::fs::File::create("parley.log").context("creating parley.log")?;
        tracing_subscriber::fmt()
            .with_env_filter("parley=debug,warn")
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let flags = args
        .flags
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--flags must be JSON")?
        .map(FlashCardFlags);

    let (navigator, nav_rx) = ChannelNavigator::channel();
    let deps = collaborators(&args, navigator)?;
    let config = ControllerConfig {
        model: args.model.clone(),
        ..ControllerConfig::default()
    };
    tracing::info!(
        store_url = %args.store_url,
        relay_url = %args.relay_url,
        offline = args.offline,
        "Client configuration loaded"
    );

    // Setup terminal with mouse capture enabled
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(deps, config, args.conversation, flags);
    app.mount(args.conversation).await;

    let result = run_event_loop(&mut terminal, &mut app, nav_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

/// Wire the collaborators for the chosen mode.
fn collaborators(args: &Args, navigator: ChannelNavigator) -> anyhow::Result<Collaborators> {
    let store: Arc<dyn DurableStore> = match &args.data_dir {
        Some(dir) => {
            tracing::info!(path = %dir, "Opening RocksDB store");
            Arc::new(RocksStore::open(dir).context("opening intent store")?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    if args.offline {
        let history = Arc::new(MemoryConversations::new());
        return Ok(Collaborators {
            conversations: history.clone(),
            assistant: Arc::new(ScriptedAssistant::echo(history)),
            navigator: Arc::new(navigator),
            store,
        });
    }

    Ok(Collaborators {
        conversations: Arc::new(HttpConversationStore::new(&args.store_url)?),
        assistant: Arc::new(HttpAssistantStream::new(&args.relay_url)?),
        navigator: Arc::new(navigator),
        store,
    })
}

/// Main event loop.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    nav_rx: mpsc::UnboundedReceiver<ConversationId>,
) -> anyhow::Result<()> {
    drive(app, nav_rx, EventStream::new(), |app, view| {
        terminal.draw(|f| ui::render(f, app, view))?;
        Ok(())
    })
    .await
}

/// Terminal input, navigation, the controller's stream signals and the
/// redraw tick are multiplexed; `draw` runs after each.
async fn drive<E, D>(
    app: &mut App,
    mut nav_rx: mpsc::UnboundedReceiver<ConversationId>,
    mut events: E,
    mut draw: D,
) -> anyhow::Result<()>
where
    E: Stream<Item = io::Result<Event>> + Unpin,
    D: FnMut(&App, &ViewModel) -> anyhow::Result<()>,
{
    loop {
        app.tick_animation();
        let view = app.view();
        draw(app, &view)?;

        let tick_rate = if view.is_streaming {
            STREAMING_TICK
        } else {
            IDLE_TICK
        };

        tokio::select! {
            () = tokio::time::sleep(tick_rate) => {}

            maybe_event = events.next() => match maybe_event {
                Some(Ok(evt)) => handle_input(app, evt).await,
                Some(Err(e)) => return Err(e).context("reading terminal event"),
                None => break,
            },

            Some(id) = nav_rx.recv() => {
                app.mount(Some(id)).await;
            }

            wake = app.controller().wait() => {
                app.controller().apply(wake).await;
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle a terminal event.
async fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key).await,
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_up(3),
            MouseEventKind::ScrollDown => app.scroll_down(3),
            _ => {}
        },
        _ => {}
    }
}

async fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c' | 'q') if ctrl => app.should_quit = true,
        KeyCode::Char('n') if ctrl => app.new_conversation().await,
        KeyCode::Char('a') if ctrl => app.move_cursor_start(),
        KeyCode::Char('e') if ctrl => app.move_cursor_end(),
        KeyCode::Char('u') if ctrl => app.clear_input(),
        KeyCode::Char('w') if ctrl => app.delete_word(),
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Enter => app.submit().await,
        KeyCode::Esc => app.clear_error(),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::PageUp => app.scroll_up(10),
        KeyCode::PageDown => app.scroll_down(10),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> io::Result<Event> {
        Ok(Event::Key(KeyEvent::new(code, modifiers)))
    }

    #[tokio::test]
    async fn typing_is_handled_while_a_response_streams() {
        let history = Arc::new(MemoryConversations::new());
        let id = history.seed("Flats");
        let (navigator, nav_rx) = ChannelNavigator::channel();
        let deps = Collaborators {
            conversations: history.clone(),
            assistant: Arc::new(ScriptedAssistant::echo(Arc::clone(&history))),
            navigator: Arc::new(navigator),
            store: Arc::new(MemoryStore::new()),
        };
        let mut app = App::new(deps, ControllerConfig::default(), Some(id), None);
        app.mount(Some(id)).await;
        app.input = "Flats in Lyon?".to_string();
        app.submit().await;
        assert!(app.controller().is_streaming());

        let events = stream::iter(vec![
            key(KeyCode::Char('h'), KeyModifiers::NONE),
            key(KeyCode::Char('i'), KeyModifiers::NONE),
            key(KeyCode::Char('q'), KeyModifiers::CONTROL),
        ])
        .chain(stream::pending());
        let mut frames = 0;
        tokio::time::timeout(
            Duration::from_secs(5),
            drive(&mut app, nav_rx, events, |_, _| {
                frames += 1;
                Ok(())
            }),
        )
        .await
        .expect("event loop did not quit")
        .unwrap();

        assert!(app.should_quit);
        assert_eq!(app.input, "hi");
        assert!(frames >= 3);
    }
}
