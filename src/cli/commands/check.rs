//! Check command - validate the configuration without watching.

use console::style;
use std::time::Instant;

use crate::channel::ChannelKind;
use crate::config::Settings;
use crate::watcher::build_groups;

/// Build every watch group once, print what would run and release it again.
pub fn run_check(settings: &Settings) -> anyhow::Result<()> {
    let groups = build_groups(settings, 0, Instant::now());

    println!(
        "{} of {} watch groups valid",
        style(groups.len()).bold(),
        settings.watchers.len()
    );

    for group in &groups {
        let mode = if group.recursive() { "recursive" } else { "flat" };
        println!("\n{} ({mode})", style(group.root().display()).cyan().bold());

        for channel in group.channels() {
            let state = if channel.is_active() {
                style("active").green()
            } else {
                style("inactive").red()
            };
            let timing = if channel.is_batched() {
                format!("every {}s", channel.emit_interval().as_secs())
            } else {
                "immediate".to_string()
            };
            let extra = match channel.kind() {
                ChannelKind::Message(message) if message.sends_attachments() => {
                    format!(", {} recipients, attachment", message.recipients().len())
                }
                ChannelKind::Message(message) => {
                    format!(", {} recipients", message.recipients().len())
                }
                ChannelKind::Alert(_) => String::new(),
            };
            println!("  {} [{state}] {timing}{extra}", channel.label());
        }
        group.release(true);
    }

    if groups.is_empty() {
        anyhow::bail!("no valid watch groups; `run` would have nothing to watch");
    }
    Ok(())
}
