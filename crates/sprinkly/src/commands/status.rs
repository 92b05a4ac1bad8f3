//! Status and listing handlers.

use std::sync::Arc;

use serde_json::Value;
use tabled::Tabled;

use sprinkly_core::{Attr, ControllerConfig, Entity, EntityKind, MemoryHost};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
}

impl EntityRow {
    fn new(e: &Entity, color: bool) -> Self {
        let state = match e.primary_value() {
            _ if !e.available => output::paint_warn("unavailable", color),
            Some(Value::Bool(on)) => output::paint_state(*on, color),
            other => output::display_value(other),
        };
        let enabled = match e.attribute(Attr::ZoneEnabled) {
            Some(Value::Bool(false)) => output::paint_warn("no", color),
            Some(Value::Bool(true)) => "yes".into(),
            _ => String::new(),
        };
        let remaining = e
            .attribute(Attr::ZoneRemaining)
            .and_then(Value::as_i64)
            .filter(|secs| *secs > 0)
            .map(format_secs)
            .unwrap_or_default();

        Self {
            id: e.id.to_string(),
            name: e.name.clone(),
            kind: e.kind.type_tag().into(),
            state,
            enabled,
            remaining,
        }
    }
}

fn format_secs(secs: i64) -> String {
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Render entities as a table / JSON / YAML / id list.
pub fn render_entities(entities: &[Arc<Entity>], global: &GlobalOpts) -> String {
    let color = output::should_color(global.color);
    output::render_list(
        global.output,
        entities,
        |e| EntityRow::new(e, color),
        |e| e.id.to_string(),
    )
}

/// Poll once and print the entities selected by `filter`.
pub async fn list(
    config: ControllerConfig,
    host: &Arc<MemoryHost>,
    global: &GlobalOpts,
    filter: impl Fn(EntityKind) -> bool,
) -> Result<(), CliError> {
    util::load(config, host).await?;
    let entities: Vec<Arc<Entity>> = host
        .snapshot()
        .iter()
        .filter(|e| filter(e.kind))
        .cloned()
        .collect();
    output::print_output(&render_entities(&entities, global), global.quiet);
    Ok(())
}

pub async fn handle(
    config: ControllerConfig,
    host: &Arc<MemoryHost>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    list(config, host, global, |_| true).await
}
