use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_banner() {
    println!();
    println!(
        "{}  {}",
        style("toolbench").bold().cyan(),
        style("tool-selection accuracy across models").dim()
    );
    println!();
}

/// Buffered block of terminal lines under a bold title.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines.push(format!(
            "  {:<28} {}",
            style(name).green().to_string(),
            style(description).dim()
        ));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines.push(format!(
            "  {} {}: {}",
            GEAR,
            style(label).bold().cyan(),
            value
        ));
        self
    }

    pub fn bullet(mut self, text: &str) -> Self {
        self.lines.push(format!("  • {}", text));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(format!("  {}", text));
        self
    }

    pub fn hint(mut self, command: &str, note: &str) -> Self {
        if note.is_empty() {
            self.lines.push(format!("    $ {}", style(command).yellow()));
        } else {
            self.lines.push(format!(
                "    $ {}  {}",
                style(command).yellow(),
                style(note).dim()
            ));
        }
        self
    }

    pub fn print(self) {
        println!("\n{}", style(&self.title).bold().underlined());
        for line in self.lines {
            println!("{}", line);
        }
    }
}
