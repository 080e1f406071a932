use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use nodex_core::{CredentialStore, FileStore, Gateway, KeyValueStore};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let file_store = FileStore::open_default()?;
    let _log_guard = logging::init(file_store.dir())?;
    info!(dir = %file_store.dir().display(), "NodeXstation starting");

    let store: Arc<dyn KeyValueStore> = Arc::new(file_store);
    let credentials = CredentialStore::load(store.clone())?.with_env_overrides();
    let mut app = App::new(store, credentials, Gateway::new());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    if let Err(e) = &result {
        error!(error = %e, "Exited with error");
    }
    info!("NodeXstation stopped");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }

    if let Some(task) = app.query_task.take() {
        task.abort();
    }
    Ok(())
}
