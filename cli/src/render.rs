//! Text and markdown rendering of stored events

use std::fmt::Write;

use provtrail_core::{StoreStats, StoredEvent};

const RULE_WIDTH: usize = 55;

fn rule() -> String {
    "━".repeat(RULE_WIDTH)
}

fn display_time(event: &StoredEvent) -> &str {
    event
        .timestamp_display
        .as_deref()
        .unwrap_or(&event.timestamp)
}

fn metadata<'a>(event: &'a StoredEvent, key: &str) -> Option<&'a str> {
    event.metadata.as_ref()?.get(key).map(String::as_str)
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Timeline as a tree per event, most recent first.
pub fn timeline(events: &[StoredEvent], project_name: &str, show_raw: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nTimeline for {}", project_name);
    let _ = writeln!(out, "{}\n", rule());

    if events.is_empty() {
        let _ = writeln!(out, "  No events found.\n");
        return out;
    }

    for event in events {
        let mut tool = event.tool_name.clone();
        if let Some(category) = metadata(event, "command_category").filter(|c| *c != "unknown") {
            let _ = write!(tool, " [{}]", category);
        }

        let _ = writeln!(out, "{}", display_time(event));
        let _ = writeln!(out, "   ├─ Tool: {}", tool);
        if let Some(path) = &event.file_path {
            let _ = writeln!(out, "   ├─ File: {}", path);
        }
        if let Some(branch) = metadata(event, "git_branch") {
            let _ = writeln!(out, "   ├─ Branch: {}", branch);
        }

        let mut operation = event.operation.to_string();
        if let Some(sha) = &event.git_commit_sha {
            let _ = write!(operation, " → {}", sha);
        }
        let _ = writeln!(out, "   ├─ Operation: {}", operation);

        match (&event.ai_summary, &event.diff_summary) {
            (Some(summary), _) => {
                let _ = writeln!(out, "   └─ Summary: {}", summary);
            }
            (None, Some(diff)) => {
                let _ = writeln!(out, "   └─ Change: {}", diff);
            }
            (None, None) => {
                let _ = writeln!(out, "   └─ (no details)");
            }
        }

        if show_raw {
            if let Some(raw) = &event.raw_input {
                let _ = writeln!(out, "\n   Raw input:");
                for line in raw.lines().take(10) {
                    let _ = writeln!(out, "   │ {}", line);
                }
            }
        }
        out.push('\n');
    }

    let session: String = events[0]
        .session_id
        .as_deref()
        .unwrap_or("unknown")
        .chars()
        .take(8)
        .collect();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Showing {} events • Session: {}", events.len(), session);
    out
}

pub fn stats(stats: &StoreStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nprovtrail statistics");
    let _ = writeln!(out, "{}\n", rule());
    let _ = writeln!(out, "  Total Events:     {}", stats.total_events);
    let _ = writeln!(out, "  Total Sessions:   {}", stats.total_sessions);
    let _ = writeln!(out, "  Unique Files:     {}", stats.unique_files);
    let _ = writeln!(
        out,
        "  First Event:      {}",
        stats.first_event.as_deref().unwrap_or("N/A")
    );
    let _ = writeln!(
        out,
        "  Last Event:       {}",
        stats.last_event.as_deref().unwrap_or("N/A")
    );

    if !stats.by_tool.is_empty() {
        let total: u64 = stats.by_tool.iter().map(|(_, n)| n).sum();
        let _ = writeln!(out, "\n  By Tool:");
        for (tool, count) in &stats.by_tool {
            let pct = *count as f64 / total as f64 * 100.0;
            let _ = writeln!(out, "    • {}:   {} events ({:.0}%)", tool, count, pct);
        }
    }

    let _ = writeln!(out, "\n{}", rule());
    out
}

/// Markdown document grouping events by display date.
pub fn markdown(events: &[StoredEvent], project_name: &str, generated: &str) -> String {
    let mut lines = vec![
        format!("# {} Timeline", project_name),
        String::new(),
        format!("Generated: {}", generated),
        String::new(),
        "## Recent Changes".to_string(),
        String::new(),
    ];

    let mut current_date: Option<&str> = None;
    for event in events {
        let full = display_time(event);
        let (date, time) = match full.split_once(' ') {
            Some((date, time)) => (date, time.trim()),
            None => (full, full),
        };

        if current_date != Some(date) {
            current_date = Some(date);
            lines.push(format!("### {}", date));
            lines.push(String::new());
        }

        let operation = title_case(event.operation.as_str());
        match &event.file_path {
            Some(path) => lines.push(format!("#### {} - {} `{}`", time, operation, path)),
            None => lines.push(format!("#### {} - {}", time, operation)),
        }
        lines.push(format!("- **Tool:** {}", event.tool_name));
        if let Some(diff) = &event.diff_summary {
            lines.push(format!("- **Change:** {}", diff));
        }
        if let Some(summary) = &event.ai_summary {
            lines.push(format!("- **Summary:** {}", summary));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use provtrail_core::Operation;

    fn event(id: i64, display: &str, path: Option<&str>) -> StoredEvent {
        StoredEvent {
            id,
            timestamp: "2026-01-08T15:54:00.000000".to_string(),
            timestamp_display: Some(display.to_string()),
            session_id: Some("0123456789ab".to_string()),
            tool_name: "Write".to_string(),
            file_path: path.map(String::from),
            operation: Operation::Create,
            diff_summary: Some("+12 lines".to_string()),
            raw_input: Some("line one\nline two".to_string()),
            ai_summary: None,
            git_commit_sha: None,
            parent_event_id: None,
            metadata: None,
        }
    }

    #[test]
    fn test_timeline_lists_events() {
        let mut commit = event(2, "01/08/2026 03:55 PM", None);
        commit.tool_name = "Bash".to_string();
        commit.operation = Operation::Commit;
        commit.git_commit_sha = Some("abc1234".to_string());
        commit.ai_summary = Some("Fix login redirect".to_string());
        commit.metadata = Some(
            [("command_category".to_string(), "git".to_string())]
                .into_iter()
                .collect(),
        );

        let out = timeline(
            &[commit, event(1, "01/08/2026 03:54 PM", Some("src/main.rs"))],
            "demo",
            true,
        );
        assert!(out.contains("Timeline for demo"));
        assert!(out.contains("Tool: Bash [git]"));
        assert!(out.contains("Operation: commit → abc1234"));
        assert!(out.contains("Summary: Fix login redirect"));
        assert!(out.contains("File: src/main.rs"));
        assert!(out.contains("Change: +12 lines"));
        assert!(out.contains("│ line two"));
        assert!(out.contains("Showing 2 events • Session: 01234567"));
    }

    #[test]
    fn test_empty_timeline() {
        assert!(timeline(&[], "demo", false).contains("No events found."));
    }

    #[test]
    fn test_stats_percentages() {
        let out = stats(&StoreStats {
            total_events: 4,
            by_tool: vec![("Write".to_string(), 3), ("Bash".to_string(), 1)],
            total_sessions: 1,
            unique_files: 2,
            first_event: None,
            last_event: None,
        });
        assert!(out.contains("Write:   3 events (75%)"));
        assert!(out.contains("Bash:   1 events (25%)"));
        assert!(out.contains("First Event:      N/A"));
    }

    #[test]
    fn test_markdown_groups_by_date() {
        let events = [
            event(3, "01/09/2026 09:00 AM", Some("src/a.rs")),
            event(2, "01/08/2026 03:55 PM", None),
            event(1, "01/08/2026 03:54 PM", Some("src/b.rs")),
        ];
        let doc = markdown(&events, "demo", "01/09/2026 10:00 AM");

        assert!(doc.starts_with("# demo Timeline\n\nGenerated: 01/09/2026 10:00 AM"));
        assert_eq!(doc.matches("### 01/08/2026").count(), 1);
        assert!(doc.contains("#### 09:00 AM - Create `src/a.rs`"));
        assert!(doc.contains("#### 03:55 PM - Create\n"));
        assert!(doc.contains("- **Change:** +12 lines"));
    }
}
