use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::Event;
use crate::schedule::event_start;

pub const PLACEHOLDER_IMAGE: &str = "/event-placeholder.png";

/// What the home page shows in its featured slot.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedCard {
    pub title: String,
    pub date_time: String,
    pub djs: Vec<String>,
    pub specials: Vec<String>,
    pub image_url: String,
    pub instagram_handle: String,
    pub instagram_link: String,
}

impl FeaturedCard {
    pub fn placeholder(instagram_handle: &str) -> Self {
        Self {
            title: "Check Back Soon!".to_string(),
            date_time: "No upcoming events scheduled.".to_string(),
            djs: vec!["TBA".to_string()],
            specials: vec!["Follow us for updates!".to_string()],
            image_url: PLACEHOLDER_IMAGE.to_string(),
            instagram_handle: instagram_handle.to_string(),
            instagram_link: instagram_link(instagram_handle),
        }
    }

    pub fn for_event(event: &Event, tz: Tz, instagram_handle: &str) -> Self {
        let date_time = event_start(event)
            .map(|start| format_start(start, tz))
            .unwrap_or_else(|| "Date to be announced".to_string());
        let image_url = event
            .image_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());

        Self {
            title: event.title.clone(),
            date_time,
            djs: event.djs.clone(),
            specials: event.specials.clone(),
            image_url,
            instagram_handle: instagram_handle.to_string(),
            instagram_link: instagram_link(instagram_handle),
        }
    }
}

/// e.g. "Saturday, May 4, 2024 at 9:00 PM", in the venue's zone.
pub fn format_start(start: DateTime<FixedOffset>, tz: Tz) -> String {
    start
        .with_timezone(&tz)
        .format("%A, %B %-d, %Y at %-I:%M %p")
        .to_string()
}

pub fn instagram_link(handle: &str) -> String {
    format!(
        "https://instagram.com/{}",
        handle.trim().trim_start_matches('@')
    )
}
