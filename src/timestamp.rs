use std::time::Duration;

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

pub fn duration_str(duration: Duration) -> String {
    time_str(duration.as_secs_f64())
}

/// Playing time of `frames` sample frames at `sample_rate`.
pub fn frames_str(frames: u64, sample_rate: u32) -> String {
    if sample_rate == 0 {
        return time_str(0.0);
    }
    time_str(frames as f64 / sample_rate as f64)
}

#[test]
fn formats_clock_time() {
    assert_eq!(time_str(0.0), "00:00:00.000");
    assert_eq!(time_str(3723.25), "01:02:03.250");
    assert_eq!(frames_str(66150, 44100), "00:00:01.500");
    assert_eq!(duration_str(Duration::from_millis(90_500)), "00:01:30.500");
}
