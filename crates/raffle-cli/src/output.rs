/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    /// A rejected operation with its machine-readable reason code
    fn failure(&self, message: &str, code: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    /// Aligned rows under a header; `columns` pairs each title with its width
    fn table(&self, columns: &[(&str, usize)], rows: &[Vec<String>]);
    fn print_json(&self, value: &serde_json::Value);
}

/// Lay out a header, a rule and one line per row
///
/// Every column but the last is left-aligned and padded to its width; cells
/// longer than the width push the rest of the line right.
pub fn render_table(columns: &[(&str, usize)], rows: &[Vec<String>]) -> Vec<String> {
    let line = |cells: Vec<&str>| {
        let mut out = String::from(" ");
        for (i, cell) in cells.iter().enumerate() {
            out.push(' ');
            match columns.get(i) {
                Some((_, width)) if i + 1 < columns.len() => {
                    out.push_str(&format!("{:<width$}", cell, width = *width))
                }
                _ => out.push_str(cell),
            }
        }
        out.trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(line(columns.iter().map(|(title, _)| *title).collect()));
    let rules: Vec<String> = columns.iter().map(|(_, w)| "-".repeat((*w).max(1))).collect();
    lines.push(line(rules.iter().map(String::as_str).collect()));
    for row in rows {
        lines.push(line(row.iter().map(String::as_str).collect()));
    }
    lines
}

/// Human-readable output formatter with checkmarks and indentation
///
/// `quiet` drops informational lines but keeps results and tables.
pub struct HumanFormatter {
    quiet: bool,
}

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn failure(&self, message: &str, _code: &str) {
        eprintln!("\u{2717} {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        if !self.quiet {
            println!("  {}", message);
        }
    }
    fn table(&self, columns: &[(&str, usize)], rows: &[Vec<String>]) {
        for line in render_table(columns, rows) {
            println!("{}", line);
        }
    }
    fn print_json(&self, _value: &serde_json::Value) {
        // Human formatter doesn't print JSON
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn failure(&self, message: &str, code: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message, "code": code})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn table(&self, _columns: &[(&str, usize)], _rows: &[Vec<String>]) {
        // JSON callers print the structured value instead
    }
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(format: OutputFormat, quiet: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter { quiet }),
    }
}
