//! Filtering, sorting and calendar grouping for the browse view and the
//! palette's search mode. Everything here is pure and never mutates its input.

use std::cmp::Ordering;

use chrono::{DateTime, Days, Local, Months, NaiveDate, TimeZone};

use crate::types::{to_datetime, DateGroup, GroupedBucket, Note, SortCriterion, SortDirection};

/// Calendar days (before yesterday) that still count as "this week".
const WEEK_LOOKBACK_DAYS: u64 = 7;

/// Case-insensitive substring match on title or content.
/// A blank query keeps every note in its original order.
pub fn filter(notes: &[Note], query: &str) -> Vec<Note> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return notes.to_vec();
    }
    notes
        .iter()
        .filter(|n| {
            n.title.to_lowercase().contains(&needle) || n.content.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

pub fn sort(notes: &[Note], criterion: SortCriterion, direction: SortDirection) -> Vec<Note> {
    let mut sorted = notes.to_vec();
    sorted.sort_by(|a, b| {
        let ord = match criterion {
            SortCriterion::LastModified => a.updated_time.cmp(&b.updated_time),
            SortCriterion::CreatedDate => a.created_time.cmp(&b.created_time),
            SortCriterion::Alphabetical => compare_titles(&a.title, &b.title),
        };
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
    sorted
}

/// Case-folded comparison first so "apple" sits next to "Apple";
/// the raw titles only break ties.
fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Group notes by `updated_time` relative to the current local date.
pub fn group_by_calendar_bucket(notes: &[Note]) -> Vec<GroupedBucket> {
    group_by_calendar_bucket_at(notes, Local::now())
}

/// Group notes by `updated_time` relative to `now`, using `now`'s time zone for
/// calendar-day boundaries. Notes keep their input order inside each bucket and
/// empty buckets are left out.
pub fn group_by_calendar_bucket_at<Tz: TimeZone>(notes: &[Note], now: DateTime<Tz>) -> Vec<GroupedBucket> {
    let today = now.date_naive();
    let tz = now.timezone();

    let mut buckets: Vec<GroupedBucket> = DateGroup::ALL
        .iter()
        .map(|&group| GroupedBucket {
            group,
            notes: Vec::new(),
            count: 0,
        })
        .collect();

    for note in notes {
        let date = to_datetime(note.updated_time).map(|at| at.with_timezone(&tz).date_naive());
        let group = classify(date, today);
        let slot = DateGroup::ALL
            .iter()
            .position(|&g| g == group)
            .unwrap_or(DateGroup::ALL.len() - 1);
        buckets[slot].notes.push(note.clone());
    }

    buckets
        .into_iter()
        .filter(|b| !b.notes.is_empty())
        .map(|mut b| {
            b.count = b.notes.len();
            b
        })
        .collect()
}

/// Bucket for a note updated on `date`, as seen on `today`.
pub fn classify(date: Option<NaiveDate>, today: NaiveDate) -> DateGroup {
    let Some(date) = date else {
        return DateGroup::Older;
    };
    if date >= today {
        return DateGroup::Today;
    }
    if today.checked_sub_days(Days::new(1)) == Some(date) {
        return DateGroup::Yesterday;
    }
    let week_start = today
        .checked_sub_days(Days::new(WEEK_LOOKBACK_DAYS))
        .unwrap_or(NaiveDate::MIN);
    if date >= week_start {
        return DateGroup::ThisWeek;
    }
    let month_start = today
        .checked_sub_months(Months::new(1))
        .unwrap_or(NaiveDate::MIN);
    if date >= month_start {
        return DateGroup::ThisMonth;
    }
    DateGroup::Older
}
