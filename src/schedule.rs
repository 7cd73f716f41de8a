use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::models::{Event, TagInput};

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").expect("valid time regex"));

/// Parses the stored `date` column. Date-only and offset-less values are taken as UTC.
pub fn parse_event_date(text: &str) -> Option<DateTime<FixedOffset>> {
    parse_date_with(text, |naive| Some(Utc.from_utc_datetime(&naive).fixed_offset()))
}

/// Reads an admin-entered `date` on the venue's wall clock. Offset-less values
/// get the venue offset in force at `time` on that day (at the written time of
/// day when `time` is absent or invalid). Values that carry an offset are kept.
pub fn parse_venue_date(text: &str, time: Option<&str>, tz: Tz) -> Option<DateTime<FixedOffset>> {
    parse_date_with(text, |naive| {
        let at = time
            .and_then(parse_time_of_day)
            .map(|time_of_day| naive.date().and_time(time_of_day))
            .unwrap_or(naive);
        venue_offset(tz, at)?.from_local_datetime(&naive).single()
    })
}

fn venue_offset(tz: Tz, at: NaiveDateTime) -> Option<FixedOffset> {
    match tz.from_local_datetime(&at) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.offset().fix()),
        // Skipped by a DST jump: the clocks already read the later offset.
        LocalResult::None => tz
            .from_local_datetime(&(at + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.offset().fix()),
    }
}

fn parse_date_with<F>(text: &str, localize: F) -> Option<DateTime<FixedOffset>>
where
    F: Fn(NaiveDateTime) -> Option<DateTime<FixedOffset>>,
{
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return localize(naive);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(localize)
}

/// `H:M` with hour 0-23 and minute 0-59.
pub fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(text.trim())?;
    let hour = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let minute = caps.get(2)?.as_str().parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Canonical start of an event: a valid `time` replaces the time of day of
/// `date`, keeping its calendar day and offset. Anything else leaves `date` as is.
pub fn resolve_start(date: DateTime<FixedOffset>, time: Option<&str>) -> DateTime<FixedOffset> {
    let Some(text) = time.map(str::trim).filter(|t| !t.is_empty()) else {
        return date;
    };
    match parse_time_of_day(text) {
        Some(time_of_day) => {
            let naive = date.date_naive().and_time(time_of_day);
            date.offset()
                .from_local_datetime(&naive)
                .single()
                .unwrap_or(date)
        }
        None => {
            warn!(time = text, "invalid event time, using the date as stored");
            date
        }
    }
}

/// Resolved start of a stored event, `None` when its date cannot be parsed.
pub fn event_start(event: &Event) -> Option<DateTime<FixedOffset>> {
    parse_event_date(&event.date).map(|date| resolve_start(date, event.time.as_deref()))
}

/// Events split around a reference instant.
#[derive(Debug, Default, Serialize)]
pub struct Schedule<'a> {
    /// Soonest first.
    pub upcoming: Vec<&'a Event>,
    /// Most recent first.
    pub past: Vec<&'a Event>,
    /// Ids of events whose date could not be parsed.
    pub skipped: Vec<&'a str>,
}

pub fn partition(events: &[Event], now: DateTime<Utc>) -> Schedule<'_> {
    let mut upcoming = Vec::new();
    let mut past = Vec::new();
    let mut skipped = Vec::new();

    for event in events {
        let Some(start) = event_start(event) else {
            warn!(id = %event.id, date = %event.date, "event date unparseable, skipping");
            skipped.push(event.id.as_str());
            continue;
        };
        if start.with_timezone(&Utc) >= now {
            upcoming.push((start, event));
        } else {
            past.push((start, event));
        }
    }

    // Both sorts are stable, so equal starts keep their input order.
    upcoming.sort_by_key(|(start, _)| *start);
    past.sort_by(|a, b| b.0.cmp(&a.0));

    Schedule {
        upcoming: upcoming.into_iter().map(|(_, event)| event).collect(),
        past: past.into_iter().map(|(_, event)| event).collect(),
        skipped,
    }
}

/// The flagged event, else the soonest upcoming one, else the most recent past one.
pub fn select_featured(events: &[Event], now: DateTime<Utc>) -> Option<&Event> {
    let mut flagged = events.iter().filter(|event| event.featured);
    if let Some(first) = flagged.next() {
        let extra = flagged.count();
        if extra > 0 {
            warn!(
                id = %first.id,
                extra,
                "more than one event is flagged featured, using the first"
            );
        }
        return Some(first);
    }

    let schedule = partition(events, now);
    schedule
        .upcoming
        .first()
        .or_else(|| schedule.past.first())
        .copied()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagField {
    Djs,
    Specials,
}

impl TagField {
    fn delimiters(self) -> &'static [char] {
        match self {
            TagField::Djs => &[','],
            // Specials were written with both separators over time.
            TagField::Specials => &[',', ';'],
        }
    }
}

/// Trimmed, non-empty tags in input order. List entries are split on the
/// field's delimiters too, which keeps the result stable under re-joining.
pub fn normalize_tags(raw: Option<&TagInput>, field: TagField) -> Vec<String> {
    let delimiters = field.delimiters();
    let split = |text: &str| -> Vec<String> {
        text.split(delimiters)
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect()
    };
    match raw {
        None => Vec::new(),
        Some(TagInput::Text(text)) => split(text.as_str()),
        // A delimiter inside a list entry splits it, so ["Tyler, the Creator"]
        // becomes two tags. Stored tags rejoin with ", " and must read back
        // the same either way.
        Some(TagInput::List(items)) => items.iter().flat_map(|item| split(item.as_str())).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, Timelike};

    fn event(id: &str, date: &str, time: Option<&str>, featured: bool) -> Event {
        Event {
            id: id.to_string(),
            title: format!("Event {id}"),
            date: date.to_string(),
            time: time.map(str::to_string),
            djs: Vec::new(),
            specials: Vec::new(),
            image_url: None,
            featured,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .expect("valid instant")
            .with_timezone(&Utc)
    }

    fn ids<'a>(events: &[&'a Event]) -> Vec<&'a str> {
        events.iter().map(|event| event.id.as_str()).collect()
    }

    #[test]
    fn valid_time_overrides_time_of_day() {
        let date = parse_event_date("2024-05-01T09:00:00-05:00").unwrap();
        for (text, hour, minute) in [("0:0", 0, 0), ("7:05", 7, 5), ("23:59", 23, 59), ("21:00", 21, 0)] {
            let start = resolve_start(date, Some(text));
            assert_eq!(
                (start.year(), start.month(), start.day()),
                (2024, 5, 1),
                "day kept for {text}"
            );
            assert_eq!((start.hour(), start.minute(), start.second()), (hour, minute, 0));
            assert_eq!(start.offset(), date.offset());
        }
    }

    #[test]
    fn venue_dates_take_the_local_offset() {
        use chrono_tz::America::Chicago;

        let summer = parse_venue_date("2024-05-04", Some("21:00"), Chicago).unwrap();
        assert_eq!(summer.to_rfc3339(), "2024-05-04T00:00:00-05:00");
        assert_eq!(
            resolve_start(summer, Some("21:00")),
            utc("2024-05-05T02:00:00Z")
        );

        let winter = parse_venue_date("2024-01-10", None, Chicago).unwrap();
        assert_eq!(winter.to_rfc3339(), "2024-01-10T00:00:00-06:00");

        // Clocks jump at 02:00 on this day; a 21:00 show is on daylight time.
        let jump = parse_venue_date("2024-03-10", Some("21:00"), Chicago).unwrap();
        assert_eq!(resolve_start(jump, Some("21:00")), utc("2024-03-11T02:00:00Z"));

        let explicit = parse_venue_date("2024-05-04T09:00:00Z", Some("21:00"), Chicago).unwrap();
        assert_eq!(explicit.to_rfc3339(), "2024-05-04T09:00:00+00:00");
        assert!(parse_venue_date("soon", None, Chicago).is_none());
    }

    #[test]
    fn invalid_time_keeps_date() {
        let date = parse_event_date("2024-05-01T09:00:00Z").unwrap();
        for text in ["25:99", "24:00", "12:60", "9pm", "21:00:00", "", "   "] {
            assert_eq!(resolve_start(date, Some(text)), date, "fallback for {text:?}");
        }
        assert_eq!(resolve_start(date, None), date);
    }

    #[test]
    fn date_only_with_time() {
        let events = vec![event("a", "2024-05-01", Some("21:00"), false)];
        let schedule = partition(&events, utc("2024-04-01T00:00:00Z"));
        assert_eq!(ids(&schedule.upcoming), vec!["a"]);
        assert!(schedule.past.is_empty());

        let start = event_start(&events[0]).unwrap();
        assert_eq!(start, utc("2024-05-01T21:00:00Z"));
    }

    #[test]
    fn timestamp_without_time_is_unchanged() {
        let stored = event("b", "2024-05-01T09:00:00Z", None, false);
        let start = event_start(&stored).unwrap();
        assert_eq!(start, utc("2024-05-01T09:00:00Z"));
        assert_eq!(start.hour(), 9);
    }

    #[test]
    fn parses_stored_date_shapes() {
        assert!(parse_event_date("2024-05-01T21:00:00.000Z").is_some());
        assert!(parse_event_date("2024-05-01T21:00").is_some());
        assert!(parse_event_date(" 2024-05-01 ").is_some());
        assert!(parse_event_date("May 1st").is_none());
        assert!(parse_event_date("").is_none());
    }

    #[test]
    fn partition_orders_and_covers_all_events() {
        let events = vec![
            event("p1", "2024-03-01", None, false),
            event("u2", "2024-06-10", Some("20:00"), false),
            event("u1", "2024-06-01", None, false),
            event("p2", "2024-03-20", Some("18:30"), false),
            event("u3", "2024-06-10", Some("20:00"), false),
            event("now", "2024-04-15T12:00:00Z", None, false),
        ];
        let now = utc("2024-04-15T12:00:00Z");
        let schedule = partition(&events, now);

        assert_eq!(schedule.upcoming.len() + schedule.past.len(), events.len());
        assert_eq!(ids(&schedule.upcoming), vec!["now", "u1", "u2", "u3"]);
        assert_eq!(ids(&schedule.past), vec!["p2", "p1"]);

        let starts: Vec<_> = schedule.upcoming.iter().map(|e| event_start(e).unwrap()).collect();
        assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
        let starts: Vec<_> = schedule.past.iter().map(|e| event_start(e).unwrap()).collect();
        assert!(starts.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn past_ties_keep_input_order() {
        let events = vec![
            event("first", "2024-01-01", None, false),
            event("second", "2024-01-01T00:00:00Z", None, false),
        ];
        let schedule = partition(&events, utc("2024-02-01T00:00:00Z"));
        assert_eq!(ids(&schedule.past), vec!["first", "second"]);
    }

    #[test]
    fn unparseable_dates_are_skipped_not_fatal() {
        let events = vec![
            event("bad", "not a date", Some("21:00"), false),
            event("good", "2024-06-01", None, false),
        ];
        let schedule = partition(&events, utc("2024-01-01T00:00:00Z"));
        assert_eq!(schedule.skipped, vec!["bad"]);
        assert_eq!(ids(&schedule.upcoming), vec!["good"]);
    }

    #[test]
    fn featured_falls_back_from_flag_to_upcoming_to_past() {
        let now = utc("2024-04-15T12:00:00Z");
        let tomorrow = (now + Duration::days(1)).to_rfc3339();
        let yesterday = (now - Duration::days(1)).to_rfc3339();

        let events = vec![
            event("1", &tomorrow, None, false),
            event("2", &yesterday, None, false),
        ];
        assert_eq!(select_featured(&events, now).map(|e| e.id.as_str()), Some("1"));

        let events = vec![event("2", &yesterday, None, false)];
        assert_eq!(select_featured(&events, now).map(|e| e.id.as_str()), Some("2"));

        assert!(select_featured(&[], now).is_none());
    }

    #[test]
    fn flagged_event_wins_even_when_past() {
        let now = utc("2024-04-15T12:00:00Z");
        let events = vec![
            event("soon", "2024-04-16", None, false),
            event("old", "2023-01-01", None, true),
            event("also", "2024-05-01", None, true),
        ];
        assert_eq!(select_featured(&events, now).map(|e| e.id.as_str()), Some("old"));
    }

    #[test]
    fn tags_from_delimited_text() {
        let raw = TagInput::Text("DJ A, , DJ B,".to_string());
        assert_eq!(normalize_tags(Some(&raw), TagField::Djs), vec!["DJ A", "DJ B"]);

        let raw = TagInput::Text("2x1 Margaritas; $5 Modelo, Free entry".to_string());
        assert_eq!(
            normalize_tags(Some(&raw), TagField::Specials),
            vec!["2x1 Margaritas", "$5 Modelo", "Free entry"]
        );
        assert!(normalize_tags(None, TagField::Djs).is_empty());
    }

    #[test]
    fn tags_from_list_are_trimmed() {
        let raw = TagInput::List(vec![" DJ A ".into(), "".into(), "  ".into(), "DJ B".into()]);
        assert_eq!(normalize_tags(Some(&raw), TagField::Djs), vec!["DJ A", "DJ B"]);
    }

    #[test]
    fn list_entries_with_delimiters_match_their_joined_form() {
        let list = TagInput::List(vec!["Tyler, the Creator".into(), "DJ B".into()]);
        let joined = TagInput::Text("Tyler, the Creator, DJ B".into());
        let expected = vec!["Tyler", "the Creator", "DJ B"];
        assert_eq!(normalize_tags(Some(&list), TagField::Djs), expected);
        assert_eq!(normalize_tags(Some(&joined), TagField::Djs), expected);

        let specials = TagInput::List(vec!["Tacos; Beer".into()]);
        assert_eq!(normalize_tags(Some(&specials), TagField::Specials), vec!["Tacos", "Beer"]);
    }

    #[test]
    fn tag_normalization_is_idempotent() {
        let inputs = [
            (TagInput::Text("DJ A, , DJ B,".into()), TagField::Djs),
            (TagInput::Text(";a;b, c ;".into()), TagField::Specials),
            (TagInput::List(vec!["x, y".into(), " z ".into()]), TagField::Djs),
            (TagInput::List(vec!["one; two".into()]), TagField::Specials),
        ];
        for (raw, field) in inputs {
            let once = normalize_tags(Some(&raw), field);
            let as_list = normalize_tags(Some(&TagInput::List(once.clone())), field);
            let as_text = normalize_tags(Some(&TagInput::Text(once.join(", "))), field);
            assert_eq!(as_list, once);
            assert_eq!(as_text, once);
        }
    }
}
