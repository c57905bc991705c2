//! Command handlers
//!
//! Each handler applies one change through the engine and writes a short
//! human-readable report. Sync happens around the handler in `main`.

use crate::cli::Command;
use anyhow::{bail, Context, Result};
use linkdeck_core::{LinkRecord, SyncEngine, WorkspaceState};
use std::io::Write;

/// Apply `command` and report to `out`
pub(crate) fn run(engine: &SyncEngine, command: &Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Show { json } => show(&engine.state(), *json, out),
        Command::Add { url, label } => {
            let added = engine.add_link(label.as_deref().unwrap_or_default(), url)?;
            writeln!(out, "added {}", describe(&added.value))?;
            Ok(())
        }
        Command::Remove { url } => remove(engine, url, out),
        Command::Group { label } => {
            let group = engine.create_group(label)?.value;
            writeln!(out, "created group {} ({})", group.label, group.id)?;
            Ok(())
        }
        Command::Pin { url, group_id } => {
            engine.promote(url, group_id)?;
            writeln!(out, "pinned {url} to {group_id}")?;
            Ok(())
        }
        Command::Unpin { url, group_id } => {
            engine.demote(url, group_id)?;
            writeln!(out, "unpinned {url} from {group_id}")?;
            Ok(())
        }
        Command::Sync => Ok(()),
    }
}

fn remove(engine: &SyncEngine, url: &str, out: &mut impl Write) -> Result<()> {
    let state = engine.state();
    let pinned_in = state
        .pinned_groups
        .iter()
        .find(|group| group.position(url).is_some())
        .map(|group| group.id.clone());

    let removed = match pinned_in {
        Some(group_id) => engine.remove_pinned_link(&group_id, url)?.value,
        None => engine.remove_link(url)?.value,
    };
    writeln!(out, "removed {}", describe(&removed))?;
    Ok(())
}

fn show(state: &WorkspaceState, json: bool, out: &mut impl Write) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(state).context("encoding state")?;
        writeln!(out, "{text}")?;
        return Ok(());
    }

    writeln!(out, "revision {}", state.revision)?;
    for group in &state.pinned_groups {
        writeln!(out, "[{}] {}", group.id, group.label)?;
        for link in &group.links {
            writeln!(out, "  {}", describe(link))?;
        }
    }
    if !state.links.is_empty() {
        writeln!(out, "free links")?;
        for link in &state.links {
            writeln!(out, "  {}", describe(link))?;
        }
    }
    Ok(())
}

fn describe(link: &LinkRecord) -> String {
    format!("{} <{}>", link.label, link.url)
}

/// Refuse `sync` when no endpoint is configured
pub(crate) fn require_remote(command: &Command, has_remote: bool) -> Result<()> {
    if *command == Command::Sync && !has_remote {
        bail!("no sync endpoint configured; pass --endpoint or set remote.endpoint");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkdeck_core::{EngineConfig, MemoryRemote, MemoryStore};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn engine() -> SyncEngine {
        SyncEngine::new(
            EngineConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRemote::new()),
        )
        .unwrap()
    }

    fn run_text(engine: &SyncEngine, command: Command) -> String {
        let mut out = Vec::new();
        run(engine, &command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn add_pin_show() {
        let engine = engine();
        let added = run_text(
            &engine,
            Command::Add {
                url: "https://www.a.example/x".to_string(),
                label: None,
            },
        );
        assert_eq!(added, "added a.example <https://www.a.example/x>\n");

        let group = engine.create_group("Daily").unwrap().value;
        run_text(
            &engine,
            Command::Pin {
                url: "https://www.a.example/x".to_string(),
                group_id: group.id.clone(),
            },
        );

        let shown = run_text(&engine, Command::Show { json: false });
        assert_eq!(
            shown,
            format!(
                "revision 0\n[{}] Daily\n  a.example <https://www.a.example/x>\n",
                group.id
            )
        );
    }

    #[test]
    fn remove_finds_pinned_links() {
        let engine = engine();
        let group = engine.create_group("G").unwrap().value;
        engine.add_link("A", "https://a.example").unwrap();
        engine.promote("https://a.example", &group.id).unwrap();

        let text = run_text(
            &engine,
            Command::Remove {
                url: "HTTPS://A.EXAMPLE".to_string(),
            },
        );
        assert_eq!(text, "removed A <https://a.example>\n");
        assert!(engine.pinned_groups()[0].links.is_empty());
    }

    #[test]
    fn validation_errors_surface() {
        let engine = engine();
        let mut out = Vec::new();
        let err = run(
            &engine,
            &Command::Add {
                url: "not a url".to_string(),
                label: None,
            },
            &mut out,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid change"));
        assert!(out.is_empty());
    }

    #[test]
    fn sync_needs_an_endpoint() {
        assert!(require_remote(&Command::Sync, false).is_err());
        assert!(require_remote(&Command::Sync, true).is_ok());
        assert!(require_remote(&Command::Show { json: true }, false).is_ok());
    }
}
