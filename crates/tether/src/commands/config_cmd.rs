//! Config subcommand handlers.

use std::fmt::Write as _;

use tether_config::{Config, save_config_to};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking passwords.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref path) = cfg.state_path {
        let _ = writeln!(out, "state_path = \"{}\"", path.display());
    }
    if let Some(ref level) = cfg.log_level {
        let _ = writeln!(out, "log_level = \"{level}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out);
    let _ = writeln!(out, "[logger]");
    let _ = writeln!(out, "enabled = {}", cfg.logger.enabled);
    let _ = writeln!(out, "pretty = {}", cfg.logger.pretty);

    for (email, account) in &cfg.accounts {
        let _ = writeln!(out);
        let _ = writeln!(out, "[accounts.\"{email}\"]");
        if let Some(ref name) = account.display_name {
            let _ = writeln!(out, "display_name = \"{name}\"");
        }
        if account.password.is_some() {
            let _ = writeln!(out, "password = \"****\"");
        }
        if let Some(ref env) = account.password_env {
            let _ = writeln!(out, "password_env = \"{env}\"");
        }
    }

    out.trim_end().to_owned()
}

/// Copy of `cfg` with plaintext passwords masked, for structured output.
fn redacted(cfg: &Config) -> Config {
    let mut copy = cfg.clone();
    for account in copy.accounts.values_mut() {
        if account.password.is_some() {
            account.password = Some("****".into());
        }
    }
    copy
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, ctx: &super::Context, global: &GlobalOpts) -> Result<(), CliError> {
    let path = &ctx.config_path;

    match args.command {
        ConfigCommand::Init { state_path, force } => {
            if path.exists() && !force {
                return Err(CliError::Conflict {
                    resource_type: "config file".into(),
                    identifier: path.display().to_string(),
                });
            }
            let cfg = Config {
                state_path,
                ..Config::default()
            };
            save_config_to(&cfg, path).map_err(|e| CliError::config(e, path))?;
            output::status(global, &format!("Wrote {}", path.display()));
            Ok(())
        }

        ConfigCommand::Show => {
            let out = match global.format() {
                OutputFormat::Table | OutputFormat::Plain => format_config_redacted(&ctx.config),
                format => {
                    output::render_single(&format, &redacted(&ctx.config), |_| String::new(), |_| {
                        String::new()
                    })?
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
    }
}
