use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use mart_load::{CategoryRow, RunSummary};
use mart_model::{
    RunReport, RunStatus, TableKind, TableName, TableReport, TableStatus, schema,
};

pub fn print_run_summary(report: &RunReport) {
    println!("Run: {}", report.run_id);
    println!("As of: {}", report.as_of.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Status: {}", report.status);
    println!("{}", table_summary(report));
    if !report.quality.is_empty() {
        println!();
        println!("Quality:");
        println!("{}", quality_summary(report));
    }
    if report.segments.customers > 0 {
        println!();
        println!("Segments ({} customers):", report.segments.customers);
        println!("{}", segment_summary(report));
    }
    if report.retention_deleted > 0 {
        println!("Retention removed {} rows", report.retention_deleted);
    }
    if !report.failures.is_empty() {
        eprintln!("Failures:");
        for failure in &report.failures {
            let table = failure.table.map_or("-", TableName::as_str);
            eprintln!("- [{}] {table}: {}", failure.stage, failure.message);
        }
    }
}

/// Per-table counters of one run.
pub fn table_summary(report: &RunReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Status"),
        header_cell("Extracted"),
        header_cell("Valid"),
        header_cell("Quarantined"),
        header_cell("Duplicates"),
        header_cell("Inserted"),
        header_cell("Updated"),
        header_cell("Unchanged"),
    ]);
    apply_summary_table_style(&mut table);
    for index in 2..9 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    let mut totals = [0u64; 7];
    for entry in &report.tables {
        let counts = row_counts(entry);
        for (total, count) in totals.iter_mut().zip(counts) {
            *total += count;
        }
        let mut row = vec![table_cell(entry.table), status_cell(entry.status)];
        row.push(Cell::new(counts[0]));
        row.push(Cell::new(counts[1]));
        row.push(count_cell(counts[2], Color::Yellow));
        row.push(count_cell(counts[3], Color::DarkYellow));
        row.extend(counts[4..].iter().map(Cell::new));
        table.add_row(row);
    }
    let mut total_row = vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        run_status_cell(report.status),
    ];
    total_row.extend(
        totals
            .iter()
            .map(|total| Cell::new(total).add_attribute(Attribute::Bold)),
    );
    table.add_row(total_row);
    table
}

fn row_counts(entry: &TableReport) -> [u64; 7] {
    [
        entry.extracted,
        entry.valid,
        entry.quarantined,
        entry.duplicates,
        entry.inserted,
        entry.updated,
        entry.unchanged,
    ]
}

/// Quality scores as percentages.
pub fn quality_summary(report: &RunReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Rows"),
        header_cell("Completeness"),
        header_cell("Uniqueness"),
        header_cell("Validity"),
        header_cell("Score"),
    ]);
    apply_table_style(&mut table);
    for index in 1..6 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for record in &report.quality {
        table.add_row(vec![
            table_cell(record.table),
            Cell::new(record.row_count),
            Cell::new(percent(record.completeness)),
            Cell::new(percent(record.uniqueness)),
            Cell::new(percent(record.validity)),
            score_cell(record.score),
        ]);
    }
    table
}

fn segment_summary(report: &RunReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Group"),
        header_cell("Segment"),
        header_cell("Customers"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    let segments = &report.segments;
    for (group, counts) in [
        ("value tier", &segments.value_tiers),
        ("activity", &segments.activity),
        ("rfm", &segments.rfm_segments),
    ] {
        for (name, count) in counts {
            table.add_row(vec![dim_cell(group), Cell::new(name), Cell::new(count)]);
        }
    }
    table
}

/// Every warehouse table with its load tier, key and source columns.
pub fn tables_listing() -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Tier"),
        header_cell("Kind"),
        header_cell("Key"),
        header_cell("Depends on"),
        header_cell("Source columns"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for name in TableName::ALL {
        let table_schema = schema(name);
        let dependencies: Vec<&str> = name
            .dependencies()
            .iter()
            .map(|dependency| dependency.as_str())
            .collect();
        let columns: Vec<&str> = table_schema
            .source_columns()
            .map(|column| column.name)
            .collect();
        table.add_row(vec![
            table_cell(name),
            Cell::new(name.tier() + 1),
            Cell::new(match name.kind() {
                TableKind::Dimension => "dimension",
                TableKind::Fact => "fact",
            }),
            Cell::new(table_schema.key.join(", ")),
            if dependencies.is_empty() {
                dim_cell("-")
            } else {
                Cell::new(dependencies.join(", "))
            },
            Cell::new(columns.join(", ")),
        ]);
    }
    table
}

/// Stored categories ordered by their hierarchy path.
pub fn categories_listing(rows: &[CategoryRow]) -> Table {
    let mut ordered: Vec<&CategoryRow> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        let a_path = a.path.as_deref().unwrap_or(&a.name);
        let b_path = b.path.as_deref().unwrap_or(&b.name);
        a_path.cmp(b_path)
    });
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Category"),
        header_cell("English"),
        header_cell("Level"),
        header_cell("Path"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for row in ordered {
        let depth = row.level.unwrap_or(1).max(1) as usize;
        table.add_row(vec![
            Cell::new(format!("{}{}", "  ".repeat(depth - 1), row.name)),
            optional_cell(row.english.as_deref()),
            row.level.map_or_else(|| dim_cell("-"), Cell::new),
            optional_cell(row.path.as_deref()),
        ]);
    }
    table
}

/// Recorded runs, most recent first.
pub fn runs_listing(runs: &[RunSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Run"),
        header_cell("As of"),
        header_cell("Status"),
        header_cell("Duration (ms)"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    for run in runs {
        table.add_row(vec![
            Cell::new(&run.run_id),
            Cell::new(&run.as_of),
            Cell::new(&run.status),
            Cell::new(run.total_ms),
        ]);
    }
    table
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

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn table_cell(name: TableName) -> Cell {
    Cell::new(name.as_str())
        .fg(Color::Blue)
        .add_attribute(Attribute::Bold)
}

fn status_cell(status: TableStatus) -> Cell {
    let color = match status {
        TableStatus::Loaded => Color::Green,
        TableStatus::PartiallyLoaded => Color::Yellow,
        TableStatus::Blocked | TableStatus::Failed => Color::Red,
        TableStatus::Skipped | TableStatus::Cancelled => Color::DarkGrey,
    };
    Cell::new(status.as_str()).fg(color)
}

fn run_status_cell(status: RunStatus) -> Cell {
    let color = match status {
        RunStatus::Succeeded => Color::Green,
        RunStatus::PartiallyFailed => Color::Yellow,
        RunStatus::Failed => Color::Red,
        RunStatus::Cancelled => Color::DarkGrey,
    };
    Cell::new(status.as_str())
        .fg(color)
        .add_attribute(Attribute::Bold)
}

fn count_cell(count: u64, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn score_cell(score: f64) -> Cell {
    let color = if score >= 0.95 {
        Color::Green
    } else if score >= 0.8 {
        Color::Yellow
    } else {
        Color::Red
    };
    Cell::new(percent(score)).fg(color)
}

fn optional_cell(value: Option<&str>) -> Cell {
    value.map_or_else(|| dim_cell("-"), Cell::new)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_render_as_percentages() {
        assert_eq!(percent(1.0), "100.0%");
        assert_eq!(percent(0.8333), "83.3%");
        assert_eq!(percent(0.0), "0.0%");
    }

    #[test]
    fn listing_has_a_row_per_table() {
        let listing = tables_listing();
        assert_eq!(listing.row_iter().count(), TableName::ALL.len());
        let keys: Vec<String> = listing
            .row_iter()
            .filter_map(|row| row.cell_iter().nth(3).map(Cell::content))
            .collect();
        assert!(keys.contains(&"order_id, order_item_id".to_string()));
    }

    #[test]
    fn categories_are_indented_by_level() {
        let rows = vec![
            CategoryRow {
                name: "chairs".to_string(),
                english: Some("Chairs".to_string()),
                parent: Some("furniture".to_string()),
                level: Some(2),
                path: Some("furniture > chairs".to_string()),
            },
            CategoryRow {
                name: "furniture".to_string(),
                english: None,
                parent: None,
                level: Some(1),
                path: Some("furniture".to_string()),
            },
        ];
        let names: Vec<String> = categories_listing(&rows)
            .row_iter()
            .filter_map(|row| row.cell_iter().next().map(Cell::content))
            .collect();
        assert_eq!(names, vec!["furniture", "  chairs"]);
    }
}
