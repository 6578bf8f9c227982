//! State command handlers.

use std::fmt::Write as _;
use std::io;

use serde_json::Value;

use crate::cli::{GlobalOpts, StateArgs, StateCommand};
use crate::error::CliError;
use crate::output;

use super::{Context, load_snapshot};

/// One-screen summary of the tree for table output.
fn summary(state: &Value) -> String {
    let mut out = String::new();
    let title = state["document"]["title"].as_str().unwrap_or_default();
    let items = state["items"]["cache"].as_array().map_or(0, Vec::len);
    let user = state["auth"]["currentUser"]["email"]
        .as_str()
        .unwrap_or("(signed out)");

    let _ = writeln!(out, "Title:    {title}");
    let _ = writeln!(out, "Items:    {items}");
    let _ = writeln!(out, "Next id:  {}", state["items"]["currentId"].as_u64().unwrap_or(0) + 1);
    let _ = write!(out, "User:     {user}");
    if let Some(message) = state["items"]["error"]["message"].as_str() {
        let _ = write!(out, "\nError:    {message}");
    }
    out
}

pub async fn handle(args: StateArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let path = ctx.state_path(global);

    match args.command {
        StateCommand::Show => {
            let store = load_snapshot(&path).await?;
            let state = store.state();
            let out =
                output::render_single(&global.format(), &*state, summary, ToString::to_string)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        StateCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        StateCommand::Reset => {
            if !global.yes {
                return Err(CliError::NonInteractiveRequiresYes {
                    action: "state reset".into(),
                });
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    output::status(global, &format!("Removed {}", path.display()));
                    Ok(())
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    output::status(global, "Nothing to reset");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn summary_reports_counts_and_error() {
        let state = json!({
            "document": {"title": "Doc"},
            "items": {
                "currentId": 3,
                "cache": [{"id": "1"}, {"id": "3"}],
                "error": {"code": "error/unknown", "message": "boom"}
            },
            "auth": {"currentUser": null, "loading": false}
        });
        let text = summary(&state);
        assert!(text.contains("Title:    Doc"));
        assert!(text.contains("Items:    2"));
        assert!(text.contains("Next id:  4"));
        assert!(text.contains("(signed out)"));
        assert!(text.ends_with("Error:    boom"));
    }
}
