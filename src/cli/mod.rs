mod channels;
mod doctor;
mod service;

use anyhow::Result;
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Service")
        .command("run", "Start the bot, the queue worker and the notifier (default)")
        .print();

    GuideSection::new("Records")
        .command("channels", "List set-up channels [--owner <user_id>]")
        .command("stats", "Show channel and archive statistics")
        .command("purge", "Delete the record of one channel: purge <channel_id>")
        .print();

    GuideSection::new("Diagnostics")
        .command("doctor", "Check configuration, store and both identities")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("linkerx").green()
    );
}

/// Value following `--owner`, if any and numeric.
pub(crate) fn parse_owner_flag(args: &[String], start: usize) -> Option<i64> {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--owner" | "-o" => {
                if i + 1 < args.len() {
                    return args[i + 1].parse().ok();
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let data_dir = NativePlatform::data_dir();

    let cmd = args.get(1).map(String::as_str).unwrap_or("run");
    match cmd {
        "run" => service::run_service(&data_dir).await,
        "doctor" => doctor::run_doctor(&data_dir).await,
        "channels" => channels::list_channels(&data_dir, parse_owner_flag(&args, 2)).await,
        "stats" => channels::print_stats(&data_dir).await,
        "purge" => match args.get(2).and_then(|a| a.parse().ok()) {
            Some(channel) => channels::purge_channel(&data_dir, channel).await,
            None => {
                print_error("Usage: linkerx purge <channel_id>");
                Ok(())
            }
        },
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_owner_flag;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn owner_flag_is_read_when_numeric() {
        assert_eq!(
            parse_owner_flag(&args(&["linkerx", "channels", "--owner", "42"]), 2),
            Some(42)
        );
        assert_eq!(
            parse_owner_flag(&args(&["linkerx", "channels", "--owner", "me"]), 2),
            None
        );
        assert_eq!(parse_owner_flag(&args(&["linkerx", "channels", "--owner"]), 2), None);
        assert_eq!(parse_owner_flag(&args(&["linkerx", "channels"]), 2), None);
    }
}
