use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use super::ChatSession;

/// A named time window used to group sessions for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecencyBucket {
    Today,
    Yesterday,
    Previous7Days,
    Previous30Days,
    Month { year: i32, month: u32 },
}

impl RecencyBucket {
    pub fn label(&self) -> String {
        match self {
            RecencyBucket::Today => "Today".to_string(),
            RecencyBucket::Yesterday => "Yesterday".to_string(),
            RecencyBucket::Previous7Days => "Previous 7 Days".to_string(),
            RecencyBucket::Previous30Days => "Previous 30 Days".to_string(),
            RecencyBucket::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1)
                .map(|date| date.format("%B %Y").to_string())
                .unwrap_or_else(|| format!("{year}-{month:02}")),
        }
    }

    /// Fixed buckets first in declaration order, then months newest first.
    fn sort_key(&self) -> (u8, i64) {
        match self {
            RecencyBucket::Today => (0, 0),
            RecencyBucket::Yesterday => (1, 0),
            RecencyBucket::Previous7Days => (2, 0),
            RecencyBucket::Previous30Days => (3, 0),
            RecencyBucket::Month { year, month } => {
                (4, -(i64::from(*year) * 12 + i64::from(*month)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionGroup {
    pub bucket: RecencyBucket,
    pub sessions: Vec<ChatSession>,
}

/// Classify `timestamp` relative to `now`, comparing calendar days in `now`'s
/// time zone. Timestamps in the future count as today.
pub fn bucket_for<Tz: TimeZone>(timestamp: DateTime<Utc>, now: &DateTime<Tz>) -> RecencyBucket {
    let local = timestamp.with_timezone(&now.timezone());
    let days_ago = now
        .date_naive()
        .signed_duration_since(local.date_naive())
        .num_days();

    match days_ago {
        ..=0 => RecencyBucket::Today,
        1 => RecencyBucket::Yesterday,
        2..=7 => RecencyBucket::Previous7Days,
        8..=30 => RecencyBucket::Previous30Days,
        _ => RecencyBucket::Month {
            year: local.year(),
            month: local.month(),
        },
    }
}

/// Group sessions by recency. Empty buckets are omitted; within a bucket,
/// sessions are ordered by timestamp, newest first.
pub fn group_sessions<Tz: TimeZone>(
    sessions: &[ChatSession],
    now: &DateTime<Tz>,
) -> Vec<SessionGroup> {
    let mut ordered: Vec<&ChatSession> = sessions.iter().collect();
    ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

    let mut groups: Vec<SessionGroup> = Vec::new();
    for session in ordered {
        let bucket = bucket_for(session.timestamp, now);
        match groups.iter_mut().find(|group| group.bucket == bucket) {
            Some(group) => group.sessions.push(session.clone()),
            None => groups.push(SessionGroup {
                bucket,
                sessions: vec![session.clone()],
            }),
        }
    }

    groups.sort_by_key(|group| group.bucket.sort_key());
    groups
}
