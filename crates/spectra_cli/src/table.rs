//! Plain-text table rendering for terminal output.

const SEPARATOR: &str = " | ";

/// Renders rows as a `|`-separated table padded to the widest cell per
/// column, with a dashed rule under the header.
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            match widths.get_mut(index) {
                Some(current) => *current = (*current).max(width),
                None => widths.push(width),
            }
        }
    }

    let render = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(index, width)| {
                let cell = cells.get(index).copied().unwrap_or("");
                format!("{cell:<width$}")
            })
            .collect();
        padded.join(SEPARATOR).trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&render(headers.to_vec()));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in rows {
        out.push_str(&render(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

/// Formats an optional number, empty when missing.
pub fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn opt_text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::format_table;

    #[test]
    fn pads_columns_to_widest_cell() {
        let table = format_table(
            &["id", "formula"],
            &[
                vec!["ASD:Fe:+1".to_string(), "Fe".to_string()],
                vec!["ASD:H:+0".to_string(), "H".to_string()],
            ],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "id        | formula");
        assert_eq!(lines[1], "----------+--------");
        assert_eq!(lines[2], "ASD:Fe:+1 | Fe");
        assert_eq!(lines[3], "ASD:H:+0  | H");
    }
}
