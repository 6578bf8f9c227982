//! Item command handlers.

use serde_json::{Value, json};
use tabled::Tabled;
use tether_core::modules::items::{self, ItemsState};
use tether_core::{ItemData, StoredItem, Surface};

use crate::cli::{GlobalOpts, ItemsArgs, ItemsCommand};
use crate::error::CliError;
use crate::output;

use super::{Context, Session, load_snapshot};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&StoredItem> for ItemRow {
    fn from(item: &StoredItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.data.name.clone(),
            url: item.data.url.clone(),
            description: item.data.description.clone(),
        }
    }
}

fn detail(item: &StoredItem) -> String {
    let mut out = format!(
        "ID:          {}\nName:        {}\nURL:         {}",
        item.id, item.data.name, item.data.url
    );
    if !item.data.description.is_empty() {
        out.push_str("\nDescription: ");
        out.push_str(&item.data.description);
    }
    out
}

fn not_found(id: &str) -> CliError {
    CliError::NotFound {
        resource_type: "item".into(),
        identifier: id.into(),
        list_command: "items list".into(),
    }
}

fn command(name: &str) -> String {
    format!("{}/{name}", items::MODULE)
}

// ── Surface round trips ─────────────────────────────────────────────

fn mirrored(surface: &Surface) -> Result<ItemsState, CliError> {
    Ok(surface.module_state(items::MODULE)?)
}

/// Turn a validation error left in the mirror into a CLI error and clear it.
///
/// The add/change commands record failures as state rather than replying
/// with an error, so the outcome has to be read back from the mirror.
async fn take_validation_error(surface: &Surface) -> Result<(), CliError> {
    let state = mirrored(surface)?;
    let Some(error) = state.error else {
        return Ok(());
    };
    surface.dispatch(&command("clearError"), Value::Null).await?;

    let details = error
        .details()
        .iter()
        .map(|d| format!("{}: {}", d.field, d.message))
        .collect::<Vec<_>>()
        .join("\n");
    Err(CliError::Rejected {
        message: error.message().into(),
        details,
    })
}

async fn add(surface: &Surface, data: ItemData) -> Result<StoredItem, CliError> {
    surface
        .dispatch(&command("add"), serde_json::to_value(&data).map_err(render_err)?)
        .await?;
    take_validation_error(surface).await?;

    let state = mirrored(surface)?;
    let id = state.current_id.to_string();
    state.get(&id).cloned().ok_or_else(|| not_found(&id))
}

async fn change(
    surface: &Surface,
    id: &str,
    name: Option<String>,
    url: Option<String>,
    description: Option<String>,
) -> Result<StoredItem, CliError> {
    let current = mirrored(surface)?
        .get(id)
        .cloned()
        .ok_or_else(|| not_found(id))?;

    let updated = StoredItem {
        id: current.id,
        data: ItemData {
            name: name.unwrap_or(current.data.name),
            url: url.unwrap_or(current.data.url),
            description: description.unwrap_or(current.data.description),
        },
    };
    surface
        .dispatch(&command("change"), serde_json::to_value(&updated).map_err(render_err)?)
        .await?;
    take_validation_error(surface).await?;
    Ok(updated)
}

async fn remove(surface: &Surface, id: &str) -> Result<(), CliError> {
    if mirrored(surface)?.get(id).is_none() {
        return Err(not_found(id));
    }
    surface.dispatch(&command("remove"), json!(id)).await?;
    Ok(())
}

/// Fail on an unknown id before a host is started, leaving the file alone.
async fn ensure_saved(ctx: &Context, global: &GlobalOpts, id: &str) -> Result<(), CliError> {
    let store = load_snapshot(&ctx.state_path(global)).await?;
    if items::state_of(&store)?.get(id).is_none() {
        return Err(not_found(id));
    }
    Ok(())
}

fn render_err(err: serde_json::Error) -> CliError {
    CliError::Render(err.to_string())
}

fn print_item(item: &StoredItem, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(&global.format(), item, detail, |i| i.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ItemsArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ItemsCommand::List => {
            let store = load_snapshot(&ctx.state_path(global)).await?;
            let state = items::state_of(&store)?;
            let out = output::render_list(
                &global.format(),
                &state.cache,
                |i| ItemRow::from(i),
                |i| i.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ItemsCommand::Get { id } => {
            let store = load_snapshot(&ctx.state_path(global)).await?;
            let state = items::state_of(&store)?;
            let item = state.get(&id).ok_or_else(|| not_found(&id))?;
            print_item(item, global)
        }

        ItemsCommand::Add {
            name,
            url,
            description,
        } => {
            let session = Session::open(ctx, global).await?;
            let data = ItemData {
                name,
                url,
                description,
            };
            let result = add(session.surface(), data).await;
            session.close().await;

            let item = result?;
            output::status(global, &format!("Item {} added", item.id));
            print_item(&item, global)
        }

        ItemsCommand::Change {
            id,
            name,
            url,
            description,
        } => {
            ensure_saved(ctx, global, &id).await?;
            let session = Session::open(ctx, global).await?;
            let result = change(session.surface(), &id, name, url, description).await;
            session.close().await;

            let item = result?;
            output::status(global, &format!("Item {} changed", item.id));
            print_item(&item, global)
        }

        ItemsCommand::Remove { id } => {
            ensure_saved(ctx, global, &id).await?;
            let session = Session::open(ctx, global).await?;
            let result = remove(session.surface(), &id).await;
            session.close().await;

            result?;
            output::status(global, &format!("Item {id} removed"));
            Ok(())
        }

        ItemsCommand::ClearError => {
            let session = Session::open(ctx, global).await?;
            let result = session
                .surface()
                .dispatch(&command("clearError"), Value::Null)
                .await;
            session.close().await;

            result?;
            output::status(global, "Item error cleared");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str) -> StoredItem {
        StoredItem {
            id: "7".into(),
            data: ItemData {
                name: "Docs".into(),
                url: "https://docs.rs".into(),
                description: description.into(),
            },
        }
    }

    #[test]
    fn detail_omits_empty_description() {
        let text = detail(&item(""));
        assert!(text.starts_with("ID:          7"));
        assert!(!text.contains("Description"));
        assert!(detail(&item("crates")).ends_with("Description: crates"));
    }

    #[test]
    fn commands_are_namespaced() {
        assert_eq!(command("clearError"), "items/clearError");
    }
}
