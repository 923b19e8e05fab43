use colored::Colorize;
use declarative::ReconcileSummary;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// One-line run summary, zero counts muted
pub fn summary_line(summary: &ReconcileSummary) -> String {
    let part = |count: usize, label: &str, paint: fn(String) -> String| {
        let text = format!("{count} {label}");
        if count == 0 { text.dimmed().to_string() } else { paint(text) }
    };
    [
        part(summary.created, "created", |t| t.green().to_string()),
        part(summary.updated, "updated", |t| t.yellow().to_string()),
        part(summary.unchanged, "unchanged", |t| t),
        part(summary.failed, "failed", |t| t.red().bold().to_string()),
    ]
    .join(", ")
}
