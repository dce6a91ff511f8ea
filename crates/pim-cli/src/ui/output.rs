//! Result rendering.

use std::collections::BTreeMap;

use comfy_table::{ContentArrangement, Table, presets};
use pim_core::resolver::{AvailableUpdate, PluginWarning};
use serde::Serialize;

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One plain line per item.
    #[default]
    Text,
    /// A YAML document keyed by section.
    Yaml,
    /// A bordered table.
    Table,
}

/// Something that can be listed in every [`OutputFormat`].
pub trait Tabular: Serialize {
    /// Top-level key in YAML output.
    const KEY: &'static str;
    /// Column headers in table output.
    const HEADERS: &'static [&'static str];

    /// Cell values, one per header.
    fn cells(&self) -> Vec<String>;

    /// Plain text line.
    fn text(&self) -> String {
        self.cells().join(" ")
    }
}

/// Render `items` in `format`. Empty input renders as an empty string in
/// text and table form.
pub fn render<T: Tabular>(format: OutputFormat, items: &[T]) -> Result<String, serde_yaml::Error> {
    match format {
        OutputFormat::Text => Ok(items
            .iter()
            .map(|i| format!("{}\n", i.text()))
            .collect()),
        OutputFormat::Yaml => {
            let doc = BTreeMap::from([(T::KEY, items)]);
            serde_yaml::to_string(&doc)
        }
        OutputFormat::Table => {
            if items.is_empty() {
                return Ok(String::new());
            }
            let mut table = Table::new();
            table
                .load_preset(presets::UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(T::HEADERS.to_vec());
            for item in items {
                table.add_row(item.cells());
            }
            Ok(format!("{table}\n"))
        }
    }
}

impl Tabular for AvailableUpdate {
    const KEY: &'static str = "availableUpdates";
    const HEADERS: &'static [&'static str] = &["Plugin", "Current", "Available"];

    fn cells(&self) -> Vec<String> {
        vec![self.name.clone(), self.current.clone(), self.latest.clone()]
    }

    fn text(&self) -> String {
        format!("{} ({}) has an available update: {}", self.name, self.current, self.latest)
    }
}

impl Tabular for PluginWarning {
    const KEY: &'static str = "securityWarnings";
    const HEADERS: &'static [&'static str] = &["Plugin", "Version", "Advisory", "Message"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.version.clone(),
            self.id.clone(),
            self.message.clone(),
        ]
    }

    fn text(&self) -> String {
        format!(
            "{} ({}) - {}: {} {}",
            self.name, self.version, self.id, self.message, self.url
        )
    }
}
