//! Admin form handling.
//!
//! Drafts are plain values advanced by [`reduce`]; nothing mutates them in
//! place. Submitting a draft runs the same validation the HTTP handlers use,
//! so a payload that passes here is exactly what the store accepts.

use chrono_tz::Tz;
use thiserror::Error;

use crate::models::{
    Event, EventChanges, EventInput, MenuItemInput, NewEvent, NewMenuItem, TagInput,
};
use crate::schedule::{normalize_tags, parse_event_date, parse_venue_date, TagField};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0} must be a non-empty string")]
    Blank(&'static str),
    #[error("date must be a valid date string (e.g. YYYY-MM-DD), got {0:?}")]
    InvalidDate(String),
    #[error("image URL must start with http:// or https://, or be empty")]
    InvalidImageUrl(String),
    #[error("no valid fields provided for update")]
    NoChanges,
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    let value = value.ok_or(ValidationError::Missing(field))?;
    non_blank(value, field)
}

fn non_blank(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Blank(field))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Normalizes to RFC 3339 on the venue's clock so the column sorts and
/// parses uniformly and a separate `time` lands in the venue offset.
fn normalize_date(value: &str, time: Option<&str>, tz: Tz) -> Result<String, ValidationError> {
    parse_venue_date(value, time, tz)
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| ValidationError::InvalidDate(value.to_string()))
}

/// `Ok(None)` means "clear the image".
fn image_url(value: &str) -> Result<Option<String>, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(Some(trimmed.to_string()))
    } else {
        Err(ValidationError::InvalidImageUrl(value.to_string()))
    }
}

pub fn validate_new_event(input: &EventInput, tz: Tz) -> Result<NewEvent, ValidationError> {
    let title = required(input.title.as_deref(), "title")?;
    let date = required(input.date.as_deref(), "date")?;
    let date = normalize_date(&date, input.time.as_deref(), tz)?;
    let image_url = match input.image_url.as_deref() {
        Some(value) => image_url(value)?,
        None => None,
    };

    Ok(NewEvent {
        title,
        date,
        time: optional_text(input.time.as_deref()),
        djs: normalize_tags(input.djs.as_ref(), TagField::Djs),
        specials: normalize_tags(input.specials.as_ref(), TagField::Specials),
        image_url,
        featured: input.featured.unwrap_or(false),
    })
}

/// Every field present in `input` must be valid; absent fields stay untouched.
pub fn validate_event_changes(
    input: &EventInput,
    tz: Tz,
) -> Result<EventChanges, ValidationError> {
    let mut changes = EventChanges::default();

    if let Some(title) = input.title.as_deref() {
        changes.title = Some(non_blank(title, "title")?);
    }
    if let Some(date) = input.date.as_deref() {
        changes.date = Some(normalize_date(date, input.time.as_deref(), tz)?);
    }
    if let Some(time) = input.time.as_deref() {
        changes.time = Some(non_blank(time, "time")?);
    }
    if input.djs.is_some() {
        changes.djs = Some(normalize_tags(input.djs.as_ref(), TagField::Djs));
    }
    if input.specials.is_some() {
        changes.specials = Some(normalize_tags(input.specials.as_ref(), TagField::Specials));
    }
    if let Some(url) = input.image_url.as_deref() {
        changes.image_url = Some(image_url(url)?);
    }
    changes.featured = input.featured;

    if changes.is_empty() {
        return Err(ValidationError::NoChanges);
    }
    Ok(changes)
}

pub fn validate_menu_item(input: &MenuItemInput) -> Result<NewMenuItem, ValidationError> {
    let name = required(input.name.as_deref(), "name")?;
    let price = required(input.price.as_deref(), "price")?;
    let image_url = match input.image_url.as_deref() {
        Some(value) => image_url(value)?,
        None => None,
    };

    Ok(NewMenuItem {
        name,
        description: optional_text(input.description.as_deref()),
        price,
        image_url,
        category: optional_text(input.category.as_deref()),
    })
}

/// State of the event editor. DJ and special rows are kept individually so
/// the editor can add and remove inputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventDraft {
    pub title: String,
    pub date: String,
    pub time: String,
    pub djs: Vec<String>,
    pub specials: Vec<String>,
    pub image_url: String,
    pub featured: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DraftAction {
    SetTitle(String),
    SetDate(String),
    SetTime(String),
    SetImageUrl(String),
    SetFeatured(bool),
    AddTag(TagField),
    EditTag(TagField, usize, String),
    RemoveTag(TagField, usize),
    Load(Box<Event>),
    Reset,
}

impl EventDraft {
    pub fn from_event(event: &Event) -> Self {
        let date = parse_event_date(&event.date)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| event.date.clone());
        Self {
            title: event.title.clone(),
            date,
            time: event.time.clone().unwrap_or_default(),
            djs: event.djs.clone(),
            specials: event.specials.clone(),
            image_url: event.image_url.clone().unwrap_or_default(),
            featured: event.featured,
        }
    }

    fn tags_mut(&mut self, field: TagField) -> &mut Vec<String> {
        match field {
            TagField::Djs => &mut self.djs,
            TagField::Specials => &mut self.specials,
        }
    }

    pub fn to_input(&self) -> EventInput {
        EventInput {
            title: Some(self.title.clone()),
            date: Some(self.date.clone()),
            time: optional_text(Some(self.time.as_str())),
            djs: Some(TagInput::List(self.djs.clone())),
            specials: Some(TagInput::List(self.specials.clone())),
            image_url: Some(self.image_url.clone()),
            featured: Some(self.featured),
        }
    }

    pub fn submit(&self, tz: Tz) -> Result<NewEvent, ValidationError> {
        validate_new_event(&self.to_input(), tz)
    }
}

pub fn reduce(draft: EventDraft, action: DraftAction) -> EventDraft {
    let mut next = draft;
    match action {
        DraftAction::SetTitle(title) => next.title = title,
        DraftAction::SetDate(date) => next.date = date,
        DraftAction::SetTime(time) => next.time = time,
        DraftAction::SetImageUrl(url) => next.image_url = url,
        DraftAction::SetFeatured(featured) => next.featured = featured,
        DraftAction::AddTag(field) => next.tags_mut(field).push(String::new()),
        DraftAction::EditTag(field, index, value) => {
            if let Some(slot) = next.tags_mut(field).get_mut(index) {
                *slot = value;
            }
        }
        DraftAction::RemoveTag(field, index) => {
            let tags = next.tags_mut(field);
            if index < tags.len() {
                tags.remove(index);
            }
        }
        DraftAction::Load(event) => next = EventDraft::from_event(&event),
        DraftAction::Reset => next = EventDraft::default(),
    }
    next
}
