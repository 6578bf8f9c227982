//! Document title handlers.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use tether_core::modules::document;

use crate::cli::{GlobalOpts, TitleArgs, TitleCommand};
use crate::error::CliError;
use crate::output;

use super::{Context, Session, load_snapshot};

fn print_title(title: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(
        &global.format(),
        &json!({ "title": title }),
        |_| title.to_owned(),
        |_| title.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn handle(args: TitleArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        TitleCommand::Get => {
            let store = load_snapshot(&ctx.state_path(global)).await?;
            let state = document::state_of(&store)?;
            print_title(&state.title, global)
        }

        TitleCommand::Set { title } => {
            let session = Session::open(ctx, global).await?;

            // The mirror reports the title only when it actually changes.
            let seen: Arc<Mutex<Option<String>>> = Arc::default();
            let sink = Arc::clone(&seen);
            let watcher = document::watch_title(session.surface(), move |new| {
                *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(new.to_owned());
            });

            let result = session
                .surface()
                .dispatch(&format!("{}/setTitle", document::MODULE), json!(title))
                .await;
            watcher.unsubscribe();
            session.close().await;
            result?;

            let changed = seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match changed {
                Some(new) => output::status(global, &format!("Title set to '{new}'")),
                None => output::status(global, "Title unchanged"),
            }
            print_title(&title, global)
        }
    }
}
