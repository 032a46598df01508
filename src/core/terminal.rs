use console::{Emoji, style};

use crate::core::orchestrator::{Health, StatusSnapshot};

pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_heading(title: &str) {
    println!("\n{} {}", SPARKLE, style(title).bold());
}

pub fn styled_health(health: Health) -> String {
    let label = health.as_str().to_uppercase();
    match health {
        Health::Healthy => style(label).green().bold().to_string(),
        Health::Degraded => style(label).yellow().bold().to_string(),
        Health::Critical => style(label).red().bold().to_string(),
    }
}

/// Renders the status table the same way the dashboard grid does.
pub fn print_snapshot(snapshot: &StatusSnapshot) {
    print_heading("Agent Status");
    print_status("Overall", &styled_health(snapshot.overall_health));
    print_status("Uptime", &format!("{:.0}s", snapshot.uptime));
    if snapshot.agents.is_empty() {
        print_info("No agent has reported yet.");
        return;
    }
    println!();
    for (name, status) in &snapshot.agents {
        println!(
            "  {:<22} {:<9} {:<10} {}",
            style(name).bold(),
            status.status.as_str(),
            styled_health(status.health),
            style(status.last_check.format("%Y-%m-%d %H:%M:%S UTC")).dim()
        );
    }
    println!();
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("BDBT agents stopped. See you next time!").bold().cyan()
    );
}
