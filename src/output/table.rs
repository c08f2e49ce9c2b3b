//! Column-aligned tables for `cluster list` and `cluster status`.

use unicode_width::UnicodeWidthStr;

/// Collects a header line and rows, then renders them padded to the widest
/// cell of each column.
#[derive(Debug)]
pub struct TableFormatter {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableFormatter {
    /// Table with the given column headers.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { headers: headers.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    /// Append a row. Missing trailing cells render empty.
    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    /// Write the table to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
    }

    /// Headers, a dashed rule under them, then the rows.
    pub fn render(&self) -> String {
        let widths = self.column_widths();
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

        let mut lines = vec![pad_row(&self.headers, &widths), rule.join("  ")];
        lines.extend(self.rows.iter().map(|row| pad_row(row, &widths)));

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            if row.len() > widths.len() {
                widths.resize(row.len(), 0);
            }
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.width());
            }
        }
        widths
    }
}

fn pad_row(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell}{}", " ".repeat(width.saturating_sub(cell.width()))))
        .collect();
    padded.join("  ").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_columns_fit_widest_cell() {
        let mut table = TableFormatter::new(["NAME", "SERVERS", "STATUS"]);
        table.row(cells(&["dev", "1/1", "running"]));
        table.row(cells(&["integration", "0/1", "stopped"]));

        assert_eq!(
            table.render(),
            "NAME         SERVERS  STATUS\n\
             -----------  -------  -------\n\
             dev          1/1      running\n\
             integration  0/1      stopped\n"
        );
    }

    #[test]
    fn test_wide_characters_are_measured_by_display_width() {
        let mut table = TableFormatter::new(["NODE", "ROLE"]);
        table.row(cells(&["ノード", "agent"]));
        let lines: Vec<String> = table.render().lines().map(String::from).collect();
        assert_eq!(lines[1], "------  -----");
        assert_eq!(lines[2], "ノード  agent");
    }

    #[test]
    fn test_empty_table_has_headers_only() {
        let table = TableFormatter::new(["NAME"]);
        assert_eq!(table.render(), "NAME\n----\n");
    }
}
