use std::{fmt::Write, fs, io, path::Path};
use term_data_table as tdt;

/// The default maximum number of rows displayed.
pub const DEFAULT_MAX_ROWS: usize = 60;

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

/// A line of a displayed table: either a numbered row, or the marker for skipped rows.
#[derive(Debug, PartialEq)]
enum Line {
    Row(usize, Vec<String>),
    Elided,
}

/// Keep the first and last `max_rows / 2` rows, replacing the middle with a marker.
///
/// `max_rows == 0` shows everything.
fn window(rows: impl IntoIterator<Item = Vec<String>>, max_rows: usize) -> Vec<Line> {
    let rows: Vec<_> = rows.into_iter().collect();
    let len = rows.len();
    let max_rows = constrain_max_rows(max_rows);
    if max_rows == 0 || max_rows >= len {
        return rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| Line::Row(idx, row))
            .collect();
    }

    let window_len = max_rows / 2;
    let mut lines = Vec::with_capacity(max_rows + 1);
    for (idx, row) in rows.into_iter().enumerate() {
        if idx < window_len || idx >= len - window_len {
            lines.push(Line::Row(idx, row));
        } else if idx == window_len {
            lines.push(Line::Elided);
        }
    }
    lines
}

/// Start a table row, with the index cell if we are showing one.
fn term_row(index: Option<String>) -> tdt::Row<'static> {
    match index {
        Some(index) => tdt::Row::new().with_cell(tdt::Cell::from(index)),
        None => tdt::Row::new(),
    }
}

/// Render rows as a terminal table.
///
/// With `index` there is a leading column of row numbers, like a dataframe dump.
pub fn term_table(
    headers: &[&str],
    rows: impl IntoIterator<Item = Vec<String>>,
    max_rows: usize,
    index: bool,
) -> String {
    let mut table = tdt::Table::new().with_row(
        headers
            .iter()
            .fold(term_row(index.then(String::new)), |row, h| {
                row.with_cell(tdt::Cell::from(h.to_string()))
            }),
    );
    for line in window(rows, max_rows) {
        let row = match line {
            Line::Row(idx, cells) => cells
                .into_iter()
                .fold(term_row(index.then(|| idx.to_string())), |row, cell| {
                    row.with_cell(tdt::Cell::from(cell))
                }),
            Line::Elided => headers
                .iter()
                .fold(term_row(index.then(|| "...".to_string())), |row, _| {
                    row.with_cell(tdt::Cell::from("...".to_string()))
                }),
        };
        table.add_row(row);
    }
    table.to_string()
}

/// Render rows as an HTML table for evcxr.
pub fn html_table(
    title: Option<&str>,
    headers: &[&str],
    rows: impl IntoIterator<Item = Vec<String>>,
    max_rows: usize,
    index: bool,
) -> String {
    let mut output = match title {
        Some(title) => {
            let mut output =
                String::from(r#"<p style="font-weight:bold;font-variant:small-caps;">"#);
            html_escape::encode_text_to_string(title, &mut output);
            output.push_str("</p>");
            output
        }
        None => String::new(),
    };

    output.push_str("<table><thead><tr>");
    if index {
        output.push_str("<th></th>");
    }
    for header in headers {
        output.push_str("<th>");
        html_escape::encode_text_to_string(header, &mut output);
        output.push_str("</th>");
    }
    output.push_str("</tr></thead><tbody>");
    for line in window(rows, max_rows) {
        match line {
            Line::Row(idx, cells) => {
                output.push_str("<tr>");
                if index {
                    let _ = write!(output, "<th>{}</th>", idx);
                }
                for cell in cells {
                    output.push_str("<td>");
                    html_escape::encode_text_to_string(&cell, &mut output);
                    output.push_str("</td>");
                }
            }
            Line::Elided => {
                output.push_str("<tr>");
                if index {
                    output.push_str("<th>...</th>");
                }
                for _ in headers {
                    output.push_str("<td>...</td>");
                }
            }
        }
        output.push_str("</tr>");
    }
    output.push_str("</tbody></table>");
    output
}

/// Hand some content to evcxr to be displayed in the notebook.
pub fn evcxr_display(mime_type: &str, content: &str) {
    println!(
        "EVCXR_BEGIN_CONTENT {}\n{}\nEVCXR_END_CONTENT",
        mime_type, content
    );
}

fn constrain_max_rows(mut max_rows: usize) -> usize {
    // make sure 0 -> 0, true since we only touch odd numbers
    if max_rows % 2 == 1 {
        if max_rows == 1 {
            max_rows = 2;
        } else {
            max_rows -= 1;
        }
    }
    max_rows
}

pub fn header(header: &str) {
    let len = header.len();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    fn rows(count: usize) -> Vec<Vec<String>> {
        (0..count).map(|idx| vec![idx.to_string()]).collect()
    }

    #[test]
    fn short_tables_are_shown_whole() {
        let lines = window(rows(4), 10);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| matches!(l, Line::Row(..))));
        assert_eq!(window(rows(100), 0).len(), 100);
    }

    #[test]
    fn long_tables_keep_head_and_tail() {
        let lines = window(rows(98), 9);
        // 9 rounds down to 8: 4 at each end plus the marker
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], Line::Row(0, vec!["0".into()]));
        assert_eq!(lines[4], Line::Elided);
        assert_eq!(lines[5], Line::Row(94, vec!["94".into()]));
        assert_eq!(lines[8], Line::Row(97, vec!["97".into()]));
    }

    #[test]
    fn html_is_escaped() {
        let html = html_table(Some("a < b"), &["x"], vec![vec!["<td>".to_string()]], 0, true);
        assert!(html.contains("a &lt; b"));
        assert!(html.contains("<tr><th>0</th><td>&lt;td&gt;</td></tr>"));
        let html = html_table(None, &["x"], vec![vec!["1".to_string()]], 0, false);
        assert!(html.contains("<tr><td>1</td></tr>"));
    }

    #[test]
    fn missing_paths_do_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(path_exists(dir.path()).unwrap());
        assert!(!path_exists(&dir.path().join("nope.xlsx")).unwrap());
    }
}
