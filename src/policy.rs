use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Weekday};

/// Half-open local time band: start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Band {
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }

    pub fn label(&self) -> String {
        format!(
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// When attendance actions are accepted: one class weekday, a check-in
/// band and a later check-out band, all in the program's reference
/// timezone.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub weekday: Weekday,
    pub check_in: Band,
    pub check_out: Band,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    CheckIn,
    CheckOut,
    Closed(ClosedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    WrongWeekday(Weekday),
    OutsideBands,
}

/// Pure function of the supplied instant; no clock reads in here.
pub fn decide(windows: &WindowConfig, now: DateTime<FixedOffset>) -> Verdict {
    if now.weekday() != windows.weekday {
        return Verdict::Closed(ClosedReason::WrongWeekday(now.weekday()));
    }
    let t = now.time();
    if windows.check_in.contains(t) {
        Verdict::CheckIn
    } else if windows.check_out.contains(t) {
        Verdict::CheckOut
    } else {
        Verdict::Closed(ClosedReason::OutsideBands)
    }
}
