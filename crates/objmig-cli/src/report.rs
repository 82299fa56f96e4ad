//! Console output of a run.

use std::fmt::Display;
use std::time::Duration;

use colored::Colorize;

const BANNER_WIDTH: usize = 74;

/// Bold title followed by one `- name: value` line per row.
pub fn print_table<V: Display>(title: &str, rows: &[(&str, V)]) {
    print!("{}", format_table(title, rows));
}

/// The text of [`print_table`], newline-terminated.
pub fn format_table<V: Display>(title: &str, rows: &[(&str, V)]) -> String {
    let mut text = format!("{}\n", title.bold());
    for line in table_lines(rows) {
        text.push_str(&line);
        text.push('\n');
    }
    text
}

fn table_lines<V: Display>(rows: &[(&str, V)]) -> Vec<String> {
    rows.iter()
        .map(|(name, value)| format!("- {name:30}: {value}"))
        .collect()
}

pub fn print_stage(title: &str) {
    let rule = "*".repeat(BANNER_WIDTH);
    println!("{rule}");
    println!("{}", title.cyan().bold());
    println!("{rule}");
}

pub fn print_elapsed(what: &str, elapsed: Duration) {
    println!("{} {}", format!("{:.3} s", elapsed.as_secs_f64()).yellow(), what);
}

/// `bytes` in MiB, as shown next to raw byte counts.
pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lines_are_aligned() {
        let lines = table_lines(&[("packed", 3u64), ("total_size_packed", 1024)]);
        assert_eq!(lines[0], format!("- packed{}: 3", " ".repeat(24)));
        assert_eq!(lines[1].find(':'), lines[0].find(':'));
        assert!(lines[1].ends_with(": 1024"));
    }

    #[test]
    fn table_text_has_title_then_rows() {
        let text = format_table("Sizes:", &[("packed", 3u64)]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Sizes:"));
        assert!(lines[1].starts_with("- packed"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn megabytes_of_bytes() {
        assert_eq!(megabytes(4 * 1024 * 1024 * 1024), 4096.0);
        assert_eq!(megabytes(0), 0.0);
    }
}
