// Groups retrieved rows into labeled sections for the prompt


use super::ContextItem;
use crate::database::SourceType;

/// Section order and headings, one per source type
const SECTIONS: [(SourceType, &str); 4] = [
    (SourceType::Chat, "CHAT MESSAGES"),
    (SourceType::Journal, "JOURNAL ENTRIES"),
    (SourceType::Doc, "DOCUMENTS"),
    (SourceType::Task, "TASKS"),
];

/// Render retrieved rows as labeled blocks, one line per row.
///
/// Rows keep the order they were given in within their section, and sections without
/// rows are left out entirely. An empty slice gives an empty string.
#[inline]
pub fn assemble_context(items: &[ContextItem]) -> String {
    let mut sections = Vec::new();

    for (source_type, heading) in SECTIONS {
        let lines: Vec<String> = items
            .iter()
            .filter(|item| item.source_type == source_type)
            .map(format_line)
            .collect();

        if lines.is_empty() {
            continue;
        }

        sections.push(format!("{heading}:\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}

fn format_line(item: &ContextItem) -> String {
    let content = item
        .content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");

    format!("- [{}] {}", item.created_at.format("%Y-%m-%d"), content)
}
