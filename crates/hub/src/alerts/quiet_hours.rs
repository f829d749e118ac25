// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quiet-hours evaluator (C9): a pure function over a user's configured
//! windows, consulted before every notification dispatch (§4.7.5).

use crate::model::{EpochMs, QuietHoursKind, QuietHoursWindow};

/// True if `now` falls inside any window in `windows` that applies to
/// `system_id` (a window with `system_id: None` is global for the user).
pub fn is_silenced(windows: &[QuietHoursWindow], system_id: &str, now: EpochMs) -> bool {
    windows
        .iter()
        .filter(|w| w.system_id.as_deref().map_or(true, |s| s == system_id))
        .any(|w| window_active(w, now))
}

fn window_active(window: &QuietHoursWindow, now: EpochMs) -> bool {
    match window.kind {
        QuietHoursKind::OneTime => now >= window.start && now <= window.end,
        QuietHoursKind::Daily => {
            let minute_of_day = minute_of_day(now);
            let start = window.start;
            let end = window.end;
            if end < start {
                minute_of_day >= start || minute_of_day <= end
            } else {
                minute_of_day >= start && minute_of_day <= end
            }
        }
    }
}

/// Minutes since midnight UTC for `now`, matching the "hour/minute fields
/// are significant" framing of a `daily` window's `start`/`end`.
fn minute_of_day(now: EpochMs) -> EpochMs {
    const MS_PER_DAY: EpochMs = 86_400_000;
    const MS_PER_MIN: EpochMs = 60_000;
    (now % MS_PER_DAY) / MS_PER_MIN
}
