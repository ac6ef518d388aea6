use colored::{ColoredString, Colorize};

use blueprint::{Action, ChangeStatus};

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

/// Symbol for an action, colored the way plans are read
pub fn action_symbol(action: Action) -> ColoredString {
    let symbol = action.symbol();
    match action {
        Action::Add => symbol.green(),
        Action::Change | Action::Transfer => symbol.yellow(),
        Action::Replace => symbol.magenta(),
        Action::Remove => symbol.red(),
        Action::Noop => symbol.dimmed(),
    }
}

/// Short label for a terminal change status
pub fn status_label(status: &ChangeStatus) -> ColoredString {
    match status {
        ChangeStatus::Applied => "applied".green(),
        ChangeStatus::Failed { .. } => "failed".red(),
        ChangeStatus::Skipped { .. } => "skipped".yellow(),
    }
}
