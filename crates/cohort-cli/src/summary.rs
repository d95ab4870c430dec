use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use cohort_cli::types::{GatherResult, MergeResult, StageStatus, StoredSummary, TableSummary};
use cohort_model::{DataIssue, IssueLog, IssueSeverity};
use cohort_persistence::Resolution;

pub fn print_gather_summary(result: &GatherResult) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Status"),
        header_cell("Tables"),
        header_cell("Rows"),
        header_cell("Time"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for outcome in &result.outcomes {
        let names: Vec<&str> = outcome.tables.iter().map(|t| t.name.prefix()).collect();
        let rows: usize = outcome.tables.iter().map(|t| t.rows).sum();
        table.add_row(vec![
            Cell::new(outcome.stage.name())
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            status_cell(&outcome.status),
            if names.is_empty() {
                dim_cell("-")
            } else {
                Cell::new(names.join(", "))
            },
            Cell::new(rows),
            dim_cell(format!("{:.1}s", outcome.duration.as_secs_f64())),
        ]);
    }
    println!("{table}");
    for outcome in &result.outcomes {
        if let StageStatus::Failed(message) = &outcome.status {
            eprintln!("- {}: {message}", outcome.stage.name());
        }
    }
    print_issue_table(&result.issues);
}

pub fn print_merge_summary(result: &MergeResult) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Role"),
        header_cell("File"),
        header_cell("Rows"),
        header_cell("Columns"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for summary in &result.inputs {
        table.add_row(table_row(summary, dim_cell("input")));
    }
    for name in &result.missing {
        table.add_row(vec![
            Cell::new(name.prefix()).fg(Color::DarkGrey),
            Cell::new("missing").fg(Color::Yellow),
            dim_cell("-"),
            dim_cell("-"),
            dim_cell("-"),
        ]);
    }
    for summary in &result.outputs {
        table.add_row(table_row(
            summary,
            Cell::new("output")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ));
    }
    println!("{table}");
    print_issue_table(&result.issues);
}

pub fn print_table_listing(listed: &[StoredSummary]) {
    let mut table = Table::new();
    table.set_header(vec!["Table", "Found by", "File", "Rows", "Columns"]);
    apply_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for entry in listed {
        let found_by = match entry.resolution {
            Resolution::Manifest => Cell::new("manifest"),
            Resolution::Modified => Cell::new("mtime").fg(Color::Yellow),
        };
        table.add_row(table_row(&entry.table, found_by));
    }
    println!("{table}");
}

fn table_row(summary: &TableSummary, role: Cell) -> Vec<Cell> {
    vec![
        Cell::new(summary.name.prefix())
            .fg(Color::Blue)
            .add_attribute(Attribute::Bold),
        role,
        Cell::new(&summary.stem),
        Cell::new(summary.rows),
        Cell::new(summary.columns),
    ]
}

fn print_issue_table(log: &IssueLog) {
    if log.is_empty() {
        return;
    }
    let mut issues: Vec<&DataIssue> = log.issues.iter().collect();
    // IssueSeverity orders Error first.
    issues.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.table.cmp(&b.table))
            .then_with(|| a.code.cmp(&b.code))
    });
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Severity"),
        header_cell("Code"),
        header_cell("Count"),
        header_cell("Message"),
    ]);
    apply_issue_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    for issue in issues {
        table.add_row(vec![
            Cell::new(&issue.table),
            severity_cell(issue.severity),
            Cell::new(issue.code.as_str()),
            match issue.count {
                Some(value) => Cell::new(value).fg(severity_color(issue.severity)),
                None => dim_cell("-"),
            },
            Cell::new(&issue.message),
        ]);
    }
    println!();
    println!(
        "Issues: {} errors, {} warnings",
        log.error_count(),
        log.warning_count()
    );
    println!("{table}");
}

fn status_cell(status: &StageStatus) -> Cell {
    match status {
        StageStatus::Completed => Cell::new("done")
            .fg(Color::Green)
            .add_attribute(Attribute::Bold),
        StageStatus::NotConfigured => dim_cell("not configured"),
        StageStatus::SourceMissing(_) => Cell::new("source missing").fg(Color::Yellow),
        StageStatus::Failed(_) => Cell::new("FAILED")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
    }
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn apply_issue_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(160);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn severity_cell(severity: IssueSeverity) -> Cell {
    match severity {
        IssueSeverity::Error => Cell::new("ERROR")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        IssueSeverity::Warning => Cell::new("WARN").fg(Color::Yellow),
        IssueSeverity::Info => Cell::new("INFO").fg(Color::DarkGrey),
    }
}

fn severity_color(severity: IssueSeverity) -> Color {
    match severity {
        IssueSeverity::Error => Color::Red,
        IssueSeverity::Warning => Color::Yellow,
        IssueSeverity::Info => Color::DarkGrey,
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
