use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "");
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

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

enum Line {
    Command(String, String),
    Status(String, String),
    Text(String),
    Blank,
}

/// A titled block of help or report lines, printed in one go.
pub struct GuideSection {
    title: String,
    lines: Vec<Line>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(Line::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(Line::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(Line::Text(text.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(Line::Blank);
        self
    }

    pub fn print(self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self
            .lines
            .iter()
            .filter_map(|l| match l {
                Line::Command(name, _) => Some(name.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        for line in self.lines {
            match line {
                Line::Command(name, description) => println!(
                    "   {}  {}",
                    style(format!("{:<width$}", name, width = width)).green(),
                    description
                ),
                Line::Status(label, value) => print_status(&label, &value),
                Line::Text(text) => println!("   {}", text),
                Line::Blank => println!(),
            }
        }
    }
}

pub fn print_banner() {
    let lines: &[&str] = &[
        " _ _       _             __  __",
        "| (_)_ __ | | _____ _ __ \\ \\/ /",
        "| | | '_ \\| |/ / _ \\ '__| \\  / ",
        "| | | | | |   <  __/ |    /  \\ ",
        "|_|_|_| |_|_|\\_\\___|_|   /_/\\_\\",
    ];

    // Horizontal gradient, teal to violet.
    let from = (45u32, 212u32, 191u32);
    let to = (139u32, 92u32, 246u32);
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(1) as u32;

    println!();
    for line in lines {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let t = (x as u32 * 1000) / width;
            let mix = |a: u32, b: u32| (a * (1000 - t) + b * t) / 1000;
            print!(
                "\x1b[38;2;{};{};{}m{}",
                mix(from.0, to.0),
                mix(from.1, to.1),
                mix(from.2, to.2),
                ch
            );
        }
        println!();
    }
    print!("\x1b[0m");
    println!(
        "{} {}\n",
        LINK,
        style("Companion agents, installed for you.").cyan()
    );
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("linkerx stopped.").bold().cyan());
}
