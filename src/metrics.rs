//! Pure aggregation over already-filtered analysis rows. Everything in here
//! is deterministic and free of I/O so the dashboard and exports can share it.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Weekday};

use crate::filters::DateRange;
use crate::models::{AnalyzedFeedback, Criticality, FeedbackType, Sentiment, DEFAULT_CHART_COLOR};

/// Direction of the positive rate between the two halves of the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub const fn arrow(self) -> &'static str {
        match self {
            Trend::Up => "▲",
            Trend::Down => "▼",
            Trend::Stable => "–",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Trend::Up => "em alta",
            Trend::Down => "em queda",
            Trend::Stable => "estável",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentimentSummary {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    /// Rounded percentage; 0 when there are no rows.
    pub positive_rate: u32,
}

pub fn sentiment_summary(rows: &[AnalyzedFeedback]) -> SentimentSummary {
    let positive = count_sentiment(rows, Sentiment::Positivo);
    let negative = count_sentiment(rows, Sentiment::Negativo);
    let neutral = count_sentiment(rows, Sentiment::Neutro);
    SentimentSummary {
        total: rows.len(),
        positive,
        negative,
        neutral,
        positive_rate: percentage(positive, rows.len()),
    }
}

fn count_sentiment(rows: &[AnalyzedFeedback], sentiment: Sentiment) -> usize {
    rows.iter().filter(|r| r.sentiment == sentiment.key()).count()
}

fn percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

/// Splits the rows (by creation time) at the midpoint and compares the
/// positive rate of the second half against the first. The thresholds are
/// deliberately asymmetric at the boundary: a difference of exactly 5 points
/// is still Stable.
pub fn trend(rows: &[AnalyzedFeedback]) -> Trend {
    if rows.len() < 4 {
        return Trend::Stable;
    }

    let mut sorted: Vec<&AnalyzedFeedback> = rows.iter().collect();
    sorted.sort_by_key(|r| r.created_at);
    let mid = sorted.len() / 2;

    let first = positive_rate_of(&sorted[..mid]);
    let second = positive_rate_of(&sorted[mid..]);
    let diff = second - first;

    if diff > 5.0 {
        Trend::Up
    } else if diff < -5.0 {
        Trend::Down
    } else {
        Trend::Stable
    }
}

fn positive_rate_of(rows: &[&AnalyzedFeedback]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let positive = rows
        .iter()
        .filter(|r| r.sentiment == Sentiment::Positivo.key())
        .count();
    positive as f64 / rows.len() as f64 * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketSize {
    Day,
    Week,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucket {
    /// Calendar day, or Monday of the ISO week for weekly buckets.
    pub start: NaiveDate,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    pub total: usize,
}

/// Daily buckets for short ranges, ISO weeks (Monday start) once the
/// selected range spans more than 30 days. Open-ended custom ranges fall
/// back to the span actually covered by the rows.
pub fn bucket_size(range: &DateRange, rows: &[AnalyzedFeedback]) -> BucketSize {
    let start = range
        .start
        .map(|dt| dt.date())
        .or_else(|| rows.iter().map(|r| r.created_at.date()).min());
    let end = range
        .end
        .map(|dt| dt.date())
        .or_else(|| rows.iter().map(|r| r.created_at.date()).max());

    match (start, end) {
        (Some(start), Some(end)) if (end - start).num_days() > 30 => BucketSize::Week,
        _ => BucketSize::Day,
    }
}

pub fn time_series(rows: &[AnalyzedFeedback], range: &DateRange) -> Vec<TimeBucket> {
    let size = bucket_size(range, rows);
    let mut buckets: BTreeMap<NaiveDate, TimeBucket> = BTreeMap::new();

    for row in rows {
        let day = row.created_at.date();
        let key = match size {
            BucketSize::Day => day,
            BucketSize::Week => day.week(Weekday::Mon).first_day(),
        };
        let bucket = buckets.entry(key).or_insert_with(|| TimeBucket {
            start: key,
            positive: 0,
            neutral: 0,
            negative: 0,
            total: 0,
        });
        bucket.total += 1;
        if row.sentiment == Sentiment::Positivo.key() {
            bucket.positive += 1;
        } else if row.sentiment == Sentiment::Negativo.key() {
            bucket.negative += 1;
        } else if row.sentiment == Sentiment::Neutro.key() {
            bucket.neutral += 1;
        }
    }

    buckets.into_values().collect()
}

/// One slice of a categorical distribution, chart-ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSlice {
    pub key: String,
    pub label: String,
    pub color: &'static str,
    pub count: usize,
}

/// Occurrences per classified type, display label and fixed color attached,
/// zero-count slices dropped, sorted descending by count. Unknown keys keep
/// the raw string as label and get the default color.
pub fn distribution_by_type(rows: &[AnalyzedFeedback]) -> Vec<DistributionSlice> {
    let known = FeedbackType::ALL
        .iter()
        .map(|t| (t.key(), t.label(), t.color()))
        .collect::<Vec<_>>();
    distribution(rows, |r| &r.classified_type, &known)
}

/// Same shape as [`distribution_by_type`] but keyed on sentiment.
pub fn distribution_by_sentiment(rows: &[AnalyzedFeedback]) -> Vec<DistributionSlice> {
    let known = Sentiment::ALL
        .iter()
        .map(|s| (s.key(), s.label(), s.color()))
        .collect::<Vec<_>>();
    distribution(rows, |r| &r.sentiment, &known)
}

fn distribution<'a>(
    rows: &'a [AnalyzedFeedback],
    key_of: impl Fn(&'a AnalyzedFeedback) -> &'a str,
    known: &[(&'static str, &'static str, &'static str)],
) -> Vec<DistributionSlice> {
    // Seed known categories first so ties keep their canonical order.
    let mut slices: Vec<DistributionSlice> = known
        .iter()
        .map(|(key, label, color)| DistributionSlice {
            key: key.to_string(),
            label: label.to_string(),
            color,
            count: 0,
        })
        .collect();

    for row in rows {
        let key = key_of(row);
        match slices.iter_mut().find(|s| s.key == key) {
            Some(slice) => slice.count += 1,
            None => slices.push(DistributionSlice {
                key: key.to_string(),
                label: key.to_string(),
                color: DEFAULT_CHART_COLOR,
                count: 1,
            }),
        }
    }

    slices.retain(|s| s.count > 0);
    slices.sort_by(|a, b| b.count.cmp(&a.count));
    slices
}

/// Count of high-criticality rows per ISO week (Monday start), ascending.
pub fn high_criticality_by_week(rows: &[AnalyzedFeedback]) -> Vec<(NaiveDate, usize)> {
    let mut weeks: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for row in rows {
        if row.criticality != Criticality::Alta.key() {
            continue;
        }
        let week = row.created_at.date().week(Weekday::Mon).first_day();
        *weeks.entry(week).or_insert(0) += 1;
    }
    weeks.into_iter().collect()
}
