use std::time::{Duration, Instant};
use tracing::info;

const BAR_LENGTH: usize = 20;
const BLOCK_CHAR: char = '\u{25A0}';
const LINE_CHAR: char = '\u{2500}';
const ETA_PLACEHOLDER: &str = "...";

/// Percent of `index` over `total`, rounded to one decimal.
pub fn percent_complete(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let raw = index as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

pub fn format_percent(percent: f64) -> String {
    if percent.fract() == 0.0 {
        format!("{}", percent as i64)
    } else {
        format!("{:.1}", percent)
    }
}

pub fn format_eta(percent: f64, elapsed: Duration) -> String {
    if percent <= 0.0 {
        return ETA_PLACEHOLDER.to_string();
    }

    let per_percent = elapsed.as_secs_f64() / percent;
    let remaining = (per_percent * (100.0 - percent)).max(0.0);
    let hours = (remaining / 3600.0).floor();
    let minutes = ((remaining - hours * 3600.0) / 60.0).floor();
    let seconds = remaining - hours * 3600.0 - minutes * 60.0;

    let mut parts = Vec::with_capacity(3);
    if hours > 0.0 {
        parts.push(format!("{}h", hours as u64));
    }
    if minutes > 0.0 {
        parts.push(format!("{}m", minutes as u64));
    }
    if seconds > 0.0 || (hours == 0.0 && minutes == 0.0) {
        parts.push(format!("{}s", seconds as u64));
    }
    parts.join(" ")
}

fn render_bar(percent: f64) -> String {
    let completed = ((BAR_LENGTH as f64 * percent / 100.0).floor() as usize).min(BAR_LENGTH);
    let mut bar = String::with_capacity(BAR_LENGTH * 3);
    bar.extend(std::iter::repeat(BLOCK_CHAR).take(completed));
    bar.extend(std::iter::repeat(LINE_CHAR).take(BAR_LENGTH - completed));
    bar
}

pub fn render_progress_line(
    index: usize,
    total: usize,
    elapsed: Duration,
    shard: &str,
    room: &str,
) -> String {
    let percent = percent_complete(index, total);
    let eta = format_eta(percent, elapsed);
    let percent_label = format!("{}%", format_percent(percent));
    let counter = format!("#{}/{}", index, total);
    let counter_width = 2 * total.to_string().len() + 2;
    format!(
        "[{}] {:<5} | {:>width$} | {}/{} | {}",
        render_bar(percent),
        percent_label,
        counter,
        shard,
        room,
        eta,
        width = counter_width,
    )
}

pub fn progress_line(
    index: usize,
    total: usize,
    started_at: Instant,
    shard: &str,
    room: &str,
) -> String {
    render_progress_line(index, total, started_at.elapsed(), shard, room)
}

/// `1234567` as `1,234,567`.
pub fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, digit) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: usize,
    shard: String,
    started_at: Instant,
}

impl ProgressReporter {
    pub fn new(total: usize, shard: impl Into<String>) -> Self {
        Self::started_at(total, shard, Instant::now())
    }

    pub fn started_at(total: usize, shard: impl Into<String>, started_at: Instant) -> Self {
        Self { total, shard: shard.into(), started_at }
    }

    pub fn report(&self, index: usize, room: &str) -> String {
        let line = progress_line(index, self.total, self.started_at, &self.shard, room);
        info!("{}", line);
        line
    }
}
