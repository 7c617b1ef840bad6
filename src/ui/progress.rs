use std::io::{self, Write};
use std::time::Instant;

pub struct ProgressBar {
    width: usize,
    start: Instant,
    first_render: bool,
}

impl ProgressBar {
    /// width = number of bar character slots (not including the brackets)
    pub fn new(width: usize) -> Self {
        Self {
            width,
            start: Instant::now(),
            first_render: true,
        }
    }

    /// Render the progress bar in place.
    /// - `percent`: 0..=100, values above 100 are clamped
    /// - `message`: stage label shown next to the bar, e.g. "Pass 2/3"
    pub fn render(&mut self, percent: u8, message: &str) {
        let pct = percent.min(100);

        let filled = ((pct as f64 / 100.0) * self.width as f64).round() as usize;
        let empty = self.width.saturating_sub(filled);

        // ANSI colors: green for filled, gray for empty, cyan for the label
        let green = "\x1b[38;5;82m";
        let gray = "\x1b[38;5;240m";
        let cyan = "\x1b[38;5;51m";
        let bold = "\x1b[1m";
        let reset = "\x1b[0m";

        let bar = format!("{}{}{}{}{}", bold, green, "█".repeat(filled), reset, gray)
            + &"░".repeat(empty)
            + reset;

        let elapsed = self.start.elapsed().as_secs();
        let timing = if pct > 0 && pct < 100 {
            let eta_secs = estimate_eta(pct, elapsed);
            format!(
                "  elapsed {}  ETA {}",
                format_duration(elapsed),
                format_duration(eta_secs)
            )
        } else {
            format!("  elapsed {}", format_duration(elapsed))
        };
        let info = format!(
            "{}{:>3}%{}  {}{}{}{}",
            bold, pct, reset, cyan, message, reset, timing
        );

        // Redraw in place: first render prints the line, later renders move the
        // cursor up one line, clear it and reprint
        if self.first_render {
            print!("[{}] {}\n", bar, info);
            self.first_render = false;
        } else {
            print!("\x1b[1A\x1b[2K\r[{}] {}\n", bar, info);
        }

        io::stdout().flush().ok();
    }
}

/// Remaining seconds assuming the rate so far holds.
pub(crate) fn estimate_eta(percent: u8, elapsed_secs: u64) -> u64 {
    if percent == 0 {
        return 0;
    }
    let pct = percent.min(100) as f64;
    (elapsed_secs as f64 * (100.0 - pct) / pct).round() as u64
}

/// Convert a byte count to a readable string
pub fn human_bytes(bytes: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bytes <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bytes;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

/// Format seconds to H:MM:SS or M:SS
pub(crate) fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
