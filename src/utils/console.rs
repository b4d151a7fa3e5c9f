// src/utils/console.rs

//! User-facing console output for the command line.
//!
//! Diagnostics go through the `log` facade; these helpers print the
//! structured progress lines a user reads while a command runs.

use std::io::Write;

use chrono::Local;
use unicode_segmentation::UnicodeSegmentation;

/// Prefix a message with the local wall-clock time.
fn stamp(message: &str) -> String {
    format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    println!("{}", stamp(&border));
    println!("{}", stamp(&format!("  {title}")));
    println!("{}", stamp(&border));
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    println!("{}", stamp(&format!("[STEP {step_num}/{total}] {message}")));
}

pub fn success(message: &str) {
    println!("{}", stamp(&format!("✓ {message}")));
}

pub fn warn(message: &str) {
    eprintln!("{}", stamp(&format!("! {message}")));
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    println!("{}", stamp(&format!("    {message}")));
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("{}", stamp(&format!("[SUMMARY] {title}")));
    for (key, value) in items {
        println!("{}", stamp(&format!("    {key}: {value}")));
    }
}

/// Rewrite the current terminal line; finish with [`progress_done`].
pub fn progress(message: &str) {
    print!("\r\x1b[2K{message}");
    let _ = std::io::stdout().flush();
}

pub fn progress_done() {
    println!();
}

/// Text bar like `[#####-----]` for a ratio in `0.0..=1.0`.
pub fn progress_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0)) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Cut `text` to at most `width` graphemes, ending in `…` when shortened.
pub fn truncate(text: &str, width: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = graphemes[..width - 1].concat();
    out.push('…');
    out
}
