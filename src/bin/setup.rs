//! chatwatch setup wizard.
//!
//! Asks for the handful of values a first run needs and writes `config.toml`
//! to the project root (`CHATWATCH_ROOT`, or the current directory).
//! Everything else keeps its default and can be edited in the file later.

use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const DEFAULT_CHAT_URL: &str = "https://discord.com/app";
const DEFAULT_POLL_MS: u64 = 1500;

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    triggers: &'a str,
    reply_text: &'a str,
    chat_url: &'a str,
    debugger_url: &'a str,
    poll_interval_ms: u64,
}

fn quoted(s: &str) -> String {
    toml::Value::String(s.to_owned()).to_string()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let triggers = p
        .triggers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(quoted)
        .collect::<Vec<_>>()
        .join(", ");

    let reply = quoted(p.reply_text);
    let chat_url = quoted(p.chat_url);
    let debugger_line = if p.debugger_url.is_empty() {
        "# debugger_url = \"http://127.0.0.1:9222\"".to_owned()
    } else {
        format!("debugger_url = {}", quoted(p.debugger_url))
    };
    let poll_interval_ms = p.poll_interval_ms;

    format!(
        r#"TRIGGERS = [{triggers}]
REPLY_TEXT = {reply}

[chat]
url = {chat_url}
{debugger_line}
user_data_dir = "browser-profile"
headless = false
login_wait_secs = 30

[monitor]
poll_interval_ms = {poll_interval_ms}
call_timeout_ms = 10000
session_lost_after = 5
skip_existing = true

[server]
bind = "127.0.0.1:5000"
start_delay_secs = 2
"#
    )
}

// ── Wizard ─────────────────────────────────────────────────────────────────────

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut buf = String::new();
    io::stdin().read_line(&mut buf)?;
    Ok(buf.trim().to_owned())
}

fn or_default(s: String, default: &str) -> String {
    if s.is_empty() {
        default.to_owned()
    } else {
        s
    }
}

fn run_wizard(project_root: &Path) -> Result<()> {
    println!("=== chatwatch setup ===\n");

    let config_path = project_root.join("config.toml");
    if config_path.exists() {
        let answer = read_line(&format!(
            "{} already exists. Overwrite? [y/N]: ",
            config_path.display()
        ))?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Left the existing file untouched.");
            return Ok(());
        }
    }

    let triggers = read_line("Trigger phrases (comma-separated): ")?;
    if triggers.split(',').all(|t| t.trim().is_empty()) {
        bail!("At least one trigger phrase is required");
    }
    let reply_text = read_line("Reply text: ")?;
    if reply_text.is_empty() {
        bail!("Reply text is required");
    }
    let chat_url = or_default(
        read_line(&format!("Chat page URL [{DEFAULT_CHAT_URL}]: "))?,
        DEFAULT_CHAT_URL,
    );
    let debugger_url = read_line(
        "Attach to a running browser? DevTools URL (optional, e.g. http://127.0.0.1:9222): ",
    )?;
    let poll = read_line(&format!("Poll interval in ms [{DEFAULT_POLL_MS}]: "))?;
    let poll_interval_ms = if poll.is_empty() {
        DEFAULT_POLL_MS
    } else {
        poll.parse()
            .with_context(|| format!("Not a number of milliseconds: {poll}"))?
    };

    let config = format_config(&ConfigParams {
        triggers: &triggers,
        reply_text: &reply_text,
        chat_url: &chat_url,
        debugger_url: &debugger_url,
        poll_interval_ms,
    });

    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Check it with:   cargo run -- check");
    println!("   Start with:      cargo run -- run");
    Ok(())
}

fn main() -> Result<()> {
    // Resolve project root: prefer CHATWATCH_ROOT env, fall back to cwd.
    let project_root =
        PathBuf::from(std::env::var("CHATWATCH_ROOT").unwrap_or_else(|_| ".".to_string()));
    run_wizard(&project_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
