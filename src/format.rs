//! Text rendering of execution results.
//!
//! [`SqlResult::format`] gives the delimited form every capability returns. The ASCII
//! table here is an alternative for interactive use of `exec`.

use crate::config::OutputFormat;
use crate::models::{RESULT_SEPARATOR, RowSet, SqlResult, format_value};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

enum Align {
    Left,
    Right,
    Center,
}

/// Pad to `width` display columns, so wide characters line up.
fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.width());
    match align {
        Align::Left => format!("{}{}", text, " ".repeat(fill)),
        Align::Right => format!("{}{}", " ".repeat(fill), text),
        Align::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(fill - left))
        }
    }
}

/// Render a row set like the MySQL CLI. Numbers are right-aligned.
pub fn format_as_table(set: &RowSet) -> String {
    if set.columns.is_empty() {
        return "Empty set".to_string();
    }

    let cells: Vec<Vec<String>> = set
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();

    let mut widths: Vec<usize> = set.columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = set
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("| {} ", pad(name, *w, Align::Center)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for (row, values) in cells.iter().zip(&set.rows) {
        let line: String = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let cell = row.get(i).map(String::as_str).unwrap_or("NULL");
                let align = match values.get(i) {
                    Some(JsonValue::Number(_)) => Align::Right,
                    _ => Align::Left,
                };
                format!("| {} ", pad(cell, *w, align))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);
    let count = set.rows.len();
    output.push_str(&format!(
        "{} {} in set",
        count,
        if count == 1 { "row" } else { "rows" }
    ));
    output
}

/// Render one result in the requested style. Results without rows always use the
/// delimited form.
pub fn render(result: &SqlResult, format: OutputFormat) -> String {
    match (format, &result.rows) {
        (OutputFormat::Table, Some(set)) if result.success && !set.columns.is_empty() => {
            format_as_table(set)
        }
        _ => result.format(),
    }
}

pub fn render_all(results: &[SqlResult], format: OutputFormat) -> String {
    results
        .iter()
        .map(|r| render(r, format))
        .collect::<Vec<_>>()
        .join(RESULT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RowSet {
        RowSet::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![json!(7), json!("widget")],
                vec![json!(12), JsonValue::Null],
            ],
        )
    }

    #[test]
    fn test_table_layout() {
        let table = format_as_table(&sample());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+----+--------+");
        assert_eq!(lines[1], "| id |  name  |");
        assert_eq!(lines[3], "|  7 | widget |");
        assert_eq!(lines[4], "| 12 | NULL   |");
        assert_eq!(lines[6], "2 rows in set");
    }

    #[test]
    fn test_wide_characters_align() {
        let set = RowSet::new(vec!["名".to_string()], vec![vec![json!("表格")]]);
        let table = format_as_table(&set);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+------+");
        assert_eq!(lines[1], "|  名  |");
        assert_eq!(lines[3], "| 表格 |");
    }

    #[test]
    fn test_render_falls_back_for_mutations() {
        let result = SqlResult::mutation(2);
        assert_eq!(render(&result, OutputFormat::Table), result.format());
        assert_eq!(
            render(&SqlResult::failure("boom"), OutputFormat::Table),
            "boom"
        );
    }

    #[test]
    fn test_render_all_plain() {
        let results = vec![SqlResult::query(sample()), SqlResult::mutation(1)];
        let text = render_all(&results, OutputFormat::Plain);
        assert_eq!(
            text,
            "id,name\n7,widget\n12,NULL\n---\nStatement executed successfully. Affected rows: 1"
        );
    }
}
