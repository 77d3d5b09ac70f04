use std::time::Instant;

/// Print the time elapsed since `start` as hours, minutes and seconds.
pub fn print_hms(start: &Instant) {
    println!("{}", format_hms(start.elapsed().as_secs()));
}

pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("Elapsed: {hours:02}:{minutes:02}:{seconds:02}")
}

/// Round half up to `decimals` places (`Math.round(x * 10^d) / 10^d`).
pub fn round_half_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor + 0.5).floor() / factor
}
