//! Long-running watch: keeps the engine (and its push channel) alive and
//! prints every attribute change until Ctrl-C.

use std::sync::Arc;

use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use tokio_stream::StreamExt;

use sprinkly_core::{
    AttributeChange, Availability, ChangeStream, Controller, ControllerConfig, EntityHost,
    MemoryHost,
};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::status;

fn format_change(at: DateTime<Local>, change: &AttributeChange, color: bool) -> String {
    let stamp = at.format("%H:%M:%S").to_string();
    let old = output::display_value(change.old.as_ref());
    let new = output::display_value(change.new.as_ref());
    if color {
        format!(
            "{} {} {}: {} -> {}",
            stamp.dimmed(),
            change.id.as_str().cyan(),
            change.attr,
            old.dimmed(),
            new.bold()
        )
    } else {
        format!("{stamp} {} {}: {old} -> {new}", change.id, change.attr)
    }
}

fn print_changes(changes: &[AttributeChange], global: &GlobalOpts) {
    let color = output::should_color(global.color);
    let now = Local::now();
    for change in changes {
        let line = match global.output {
            OutputFormat::Table | OutputFormat::Plain => format_change(now, change, color),
            _ => output::render_single(
                OutputFormat::JsonCompact,
                change,
                |_| String::new(),
                |_| String::new(),
            ),
        };
        output::print_output(&line, global.quiet);
    }
}

pub async fn handle(
    config: ControllerConfig,
    host: Arc<MemoryHost>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let dyn_host: Arc<dyn EntityHost> = host.clone();
    let controller = Controller::new(config, dyn_host);
    controller.start().await?;

    let result = watch_loop(&controller, &host, global).await;
    controller.stop().await;
    result
}

async fn watch_loop(
    controller: &Controller,
    host: &Arc<MemoryHost>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut availability = controller.availability();

    controller.refresh().await?;
    let mut changes: ChangeStream = host.subscribe().into_changes();
    output::print_output(&status::render_entities(&host.snapshot(), global), global.quiet);
    if !global.quiet {
        eprintln!("Watching for changes (Ctrl-C to exit)");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            changed = availability.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *availability.borrow_and_update();
                match state {
                    Availability::Unavailable => tracing::warn!("controller unavailable"),
                    Availability::Available => tracing::info!("controller available"),
                    Availability::Unknown => {}
                }
            }

            batch = changes.next() => {
                let Some(batch) = batch else { break };
                print_changes(&batch, global);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use sprinkly_core::{Attr, EntityId};

    #[test]
    fn plain_line_has_timestamp_and_transition() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).single();
        let Some(at) = at else { return };
        let change = AttributeChange {
            id: EntityId::zone(0),
            attr: Attr::ZoneState,
            old: Some(json!(false)),
            new: Some(json!(true)),
        };
        assert_eq!(
            format_change(at, &change, false),
            "06:30:00 os_station_1 irrigation_zone.state: false -> true"
        );
    }

    #[test]
    fn removed_attribute_shows_placeholder() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).single();
        let Some(at) = at else { return };
        let change = AttributeChange {
            id: EntityId::rain_delay(),
            attr: Attr::BinaryState,
            old: Some(json!(true)),
            new: None,
        };
        let line = format_change(at, &change, false);
        assert!(line.starts_with("06:30:00 os_raindelay "), "{line}");
        assert!(line.ends_with("true -> -"), "{line}");
    }
}
