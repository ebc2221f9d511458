use crate::records::{QUALITY_MAX, QUALITY_MIN, SleepSession};

/// Label shown for a rating value, mirroring the rating icons the
/// presentation layer offers.
pub fn quality_label(quality: i32) -> &'static str {
    match quality {
        0 => "very bad",
        1 => "poor",
        2 => "so-so",
        3 => "ok",
        4 => "pretty good",
        5 => "excellent",
        _ => "unrated",
    }
}

/// Render the history (most recent first) into display text. `limit`
/// caps the number of lines; 0 means unlimited.
pub fn format_history(sessions: &[SleepSession], limit: usize) -> String {
    if sessions.is_empty() {
        return String::from("No sleep history yet.");
    }

    let shown = if limit > 0 && sessions.len() > limit {
        &sessions[..limit]
    } else {
        sessions
    };

    let mut out = String::new();
    for session in shown {
        out.push_str(&format_session(session));
        out.push('\n');
    }
    if shown.len() < sessions.len() {
        out.push_str(&format!("... and {} more\n", sessions.len() - shown.len()));
    }
    out
}

fn format_session(session: &SleepSession) -> String {
    let started = session.start_time.format("%Y-%m-%d %H:%M");
    if session.is_active() {
        return format!("{started}  in progress");
    }
    let minutes = session.duration().num_minutes();
    let slept = format!("{}h {:02}m", minutes / 60, minutes % 60);
    let quality = if (QUALITY_MIN..=QUALITY_MAX).contains(&session.quality) {
        format!("{}/{} ({})", session.quality, QUALITY_MAX, quality_label(session.quality))
    } else {
        String::from("unrated")
    };
    format!("{started}  slept {slept}  quality {quality}")
}
