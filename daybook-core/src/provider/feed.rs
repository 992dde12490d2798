//! Read-only ICS subscription feed adapter.
//!
//! Fetches a published .ics feed over HTTP(S) and reports each VEVENT as
//! an upsert keyed by its UID within the subscription. Feeds are a
//! snapshot format: they cannot signal deletions against a watermark, so
//! the adapter never emits `Delete` changes, and it never writes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use icalendar::parser::{read_calendar, unfold, Component};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use tracing::debug;
use url::Url;

use crate::error::ProviderError;
use crate::provider::{ProviderAdapter, RemoteChange};
use crate::record::{ExternalKey, ItemKind, Priority, RecordContent};

pub struct FeedAdapter {
    name: String,
    endpoint: Url,
    client: reqwest::Client,
}

impl FeedAdapter {
    pub fn new(name: impl Into<String>, endpoint: Url) -> Self {
        FeedAdapter {
            name: name.into(),
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FeedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_write(&self) -> bool {
        false
    }

    async fn list_changes(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteChange>, ProviderError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("feed fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "feed returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("feed body: {e}")))?;

        let changes = parse_feed(&self.name, &body, since)?;
        debug!(feed = %self.name, count = changes.len(), "parsed feed changes");
        Ok(changes)
    }
}

/// Parse an ICS document into upsert changes for this subscription.
///
/// Events without a LAST-MODIFIED stamp are always included; the engine
/// treats them as modified at pull time, which keeps a stampless feed
/// converging instead of silently stale.
fn parse_feed(
    subscription: &str,
    content: &str,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<RemoteChange>, ProviderError> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| ProviderError::Rejected(format!("feed is not valid ICS: {e}")))?;

    let mut changes = Vec::new();
    for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        let Some(item) = parse_vevent(vevent) else {
            continue;
        };
        let (uid, content, modified) = item;

        if let (Some(since), Some(modified)) = (since, modified) {
            if modified <= since {
                continue;
            }
        }

        changes.push(RemoteChange::Upsert {
            key: ExternalKey::in_collection(uid, subscription),
            content,
            modified,
        });
    }
    Ok(changes)
}

fn parse_vevent(vevent: &Component) -> Option<(String, RecordContent, Option<DateTime<Utc>>)> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());

    let (start, all_day) =
        to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| to_utc(dpt).0);

    let notes = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let modified = vevent
        .find_prop("LAST-MODIFIED")
        .and_then(|p| parse_ics_timestamp(p.val.as_ref()));

    // Recurrence stays opaque: the raw RRULE value is carried as bytes
    // and never interpreted here.
    let recurrence = vevent
        .find_prop("RRULE")
        .map(|p| p.val.to_string().into_bytes());

    let content = RecordContent {
        kind: ItemKind::Event,
        title: summary,
        start,
        end,
        all_day,
        notes,
        completed: false,
        category: "subscription".to_string(),
        reminder_minutes: None,
        recurrence,
        location,
        priority: Priority::None,
    };

    Some((uid, content, modified))
}

fn to_utc(dpt: DatePerhapsTime) -> (DateTime<Utc>, bool) {
    match dpt {
        DatePerhapsTime::Date(d) => (d.and_time(NaiveTime::MIN).and_utc(), true),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => (dt, false),
            CalendarDateTime::Floating(naive) => (naive.and_utc(), false),
            // Feeds are display-only here; zone-exact conversion is the
            // consumer's concern, the engine only needs a stable instant.
            CalendarDateTime::WithTimezone { date_time, .. } => (date_time.and_utc(), false),
        },
    }
}

/// Parse an ICS UTC timestamp (`20260101T120000Z`, or floating).
fn parse_ics_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}
