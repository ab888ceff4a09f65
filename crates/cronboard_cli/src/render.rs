use chrono::{DateTime, Local};
use cronboard_core::classify::{DisplayEntry, Snapshot};
use cronboard_core::config::Palette;
use cronboard_core::model::OccurrencePair;
use tabled::settings::Style;
use tabled::{Table, Tabled};

pub struct Section<'a> {
    pub key: &'static str,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub entries: &'a [DisplayEntry],
}

pub fn sections(snapshot: &Snapshot) -> [Section<'_>; 4] {
    let sections = &snapshot.sections;
    [
        Section {
            key: "upcoming",
            title: "Coming up",
            subtitle: "next 24 hours",
            entries: &sections.upcoming,
        },
        Section {
            key: "recent_past",
            title: "Just passed",
            subtitle: "last three hours",
            entries: &sections.recent_past,
        },
        Section {
            key: "other_upcoming",
            title: "Other upcoming events",
            subtitle: "All upcoming events beyond 24 hours from now",
            entries: &sections.other_upcoming,
        },
        Section {
            key: "other_past",
            title: "Other past events",
            subtitle: "All past events beyond three hours ago from now",
            entries: &sections.other_past,
        },
    ]
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "When")]
    when: String,
    #[tabled(rename = "Task")]
    task: String,
}

pub fn render_plain(snapshot: &Snapshot, palette: &Palette) -> String {
    let mut out = String::new();

    for section in sections(snapshot) {
        out.push_str(&palette.accentize(section.title));
        out.push_str(" | ");
        out.push_str(&palette.mutedize(section.subtitle));
        out.push('\n');

        if section.entries.is_empty() {
            out.push_str(&palette.mutedize("(none)"));
            out.push('\n');
        } else {
            let rows = section.entries.iter().map(|entry| EntryRow {
                when: entry.display_timestamp(),
                task: entry.name.clone(),
            });
            let mut table = Table::new(rows);
            table.with(Style::sharp());
            out.push_str(&table.to_string());
            out.push('\n');
        }
        out.push('\n');
    }

    for excluded in &snapshot.excluded {
        out.push_str(&format!(
            "Skipped task: {} ({}) - {}\n",
            excluded.record.name,
            excluded.record.id,
            excluded.error.message()
        ));
    }

    out
}

fn entries_json(entries: &[DisplayEntry]) -> serde_json::Value {
    serde_json::Value::Array(
        entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "name": entry.name,
                    "timestamp": entry.at.to_rfc3339(),
                    "display_timestamp": entry.display_timestamp(),
                })
            })
            .collect(),
    )
}

pub fn render_json(snapshot: &Snapshot) -> serde_json::Value {
    let mut payload = serde_json::Map::new();
    payload.insert(
        "evaluated_at".to_string(),
        serde_json::Value::String(snapshot.evaluated_at.to_rfc3339()),
    );
    for section in sections(snapshot) {
        payload.insert(section.key.to_string(), entries_json(section.entries));
    }

    let excluded = snapshot
        .excluded
        .iter()
        .map(|excluded| {
            serde_json::json!({
                "id": excluded.record.id,
                "name": excluded.record.name,
                "cron": excluded.record.cron_expression,
                "error": excluded.error.code(),
                "message": excluded.error.message(),
            })
        })
        .collect();
    payload.insert("excluded".to_string(), serde_json::Value::Array(excluded));

    serde_json::Value::Object(payload)
}

pub fn render_occurrences_plain(
    expression: &str,
    reference: DateTime<Local>,
    pair: &OccurrencePair,
) -> String {
    format!(
        "Cron: {}\nReference: {}\nPrevious: {}\nNext: {}",
        expression,
        reference.to_rfc3339(),
        pair.previous.to_rfc3339(),
        pair.next.to_rfc3339()
    )
}

pub fn render_occurrences_json(
    expression: &str,
    reference: DateTime<Local>,
    pair: &OccurrencePair,
) -> serde_json::Value {
    serde_json::json!({
        "cron": expression,
        "reference": reference.to_rfc3339(),
        "previous": pair.previous.to_rfc3339(),
        "next": pair.next.to_rfc3339(),
    })
}
