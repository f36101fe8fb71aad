use tabled::{Table, Tabled, settings::Style};

use crate::diary::Entry;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "#")]
    index: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Content")]
    content: String,
}

impl From<&Entry> for EntryRow {
    fn from(entry: &Entry) -> Self {
        Self {
            uid: entry.uid.map(|u| u.to_string()).unwrap_or_default(),
            index: entry.index,
            title: entry.title.clone(),
            content: preview(&entry.content, 48),
        }
    }
}

/// First line of `text`, cut to `width` characters
fn preview(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= width {
        return line.to_string();
    }
    let cut: String = line.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", cut)
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

pub fn entries_table(entries: &[Entry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let rows: Vec<EntryRow> = entries.iter().map(EntryRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_cuts_long_lines() {
        assert_eq!(preview("short\nsecond line", 10), "short");
        assert_eq!(preview("abcdefghijkl", 5), "abcd…");
        assert_eq!(preview("", 5), "");
    }

    #[test]
    fn test_entries_table() {
        let entry = Entry {
            uid: Some(3),
            date: "2024-01-01".into(),
            index: 0,
            title: "Morning".into(),
            content: "Coffee".into(),
        };
        let table = entries_table(&[entry]);
        assert!(table.contains("Morning"));
        assert!(table.contains("UID"));
        assert!(entries_table(&[]).is_empty());
        assert!(stats_table(&[("Records", "3")]).contains("Records"));
    }
}
