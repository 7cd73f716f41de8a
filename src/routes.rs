use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::config::AppConfig;
use crate::db::Store;
use crate::display::FeaturedCard;
use crate::error::ApiError;
use crate::forms::{validate_event_changes, validate_menu_item, validate_new_event};
use crate::menu::{self, MenuSection};
use crate::models::{Event, EventInput, MenuItem, MenuItemInput};
use crate::schedule::{partition, select_featured};
use crate::uploads::{image_key, ImageUploader};

pub struct AppState {
    pub config: AppConfig,
    pub timezone: Tz,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Arc<Self>, crate::config::ConfigError> {
        let timezone = config.venue_timezone()?;
        Ok(Arc::new(Self { config, timezone }))
    }
}

/// Runs `work` against a fresh connection on the blocking pool.
async fn with_store<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Store) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let path = state.config.database_path.clone();
    tokio::task::spawn_blocking(move || {
        let mut store = Store::open(&path)?;
        work(&mut store)
    })
    .await?
}

async fn all_events(state: &AppState) -> Result<Vec<Event>, ApiError> {
    with_store(state, |store| Ok(store.list_events()?)).await
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventFilter {
    Upcoming,
    Past,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    filter: Option<EventFilter>,
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = all_events(&state).await?;
    let Some(filter) = query.filter else {
        return Ok(Json(events));
    };

    let schedule = partition(&events, Utc::now());
    let selected = match filter {
        EventFilter::Upcoming => schedule.upcoming,
        EventFilter::Past => schedule.past,
    };
    Ok(Json(selected.into_iter().cloned().collect()))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(input): Json<EventInput>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let new = validate_new_event(&input, state.timezone)?;
    let event = with_store(&state, move |store| Ok(store.create_event(&new)?)).await?;
    info!(id = %event.id, featured = event.featured, "event created");
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let event = with_store(&state, move |store| {
        store.get_event(&id).map_err(ApiError::from_store("event"))
    })
    .await?;
    Ok(Json(event))
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<EventInput>,
) -> Result<Json<Event>, ApiError> {
    let changes = validate_event_changes(&input, state.timezone)?;
    let event = with_store(&state, move |store| {
        store
            .update_event(&id, &changes)
            .map_err(ApiError::from_store("event"))
    })
    .await?;
    info!(id = %event.id, "event updated");
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = id.clone();
    with_store(&state, move |store| {
        store.delete_event(&id).map_err(ApiError::from_store("event"))
    })
    .await?;
    info!(id = %deleted, "event deleted");
    Ok(Json(json!({ "message": "Event deleted successfully" })))
}

pub async fn set_featured(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let event = with_store(&state, move |store| {
        store.set_featured(&id).map_err(ApiError::from_store("event"))
    })
    .await?;
    info!(id = %event.id, "event featured");
    Ok(Json(event))
}

pub async fn featured_event(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<Event>>, ApiError> {
    let events = all_events(&state).await?;
    Ok(Json(select_featured(&events, Utc::now()).cloned()))
}

pub async fn featured_card(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FeaturedCard>, ApiError> {
    let events = all_events(&state).await?;
    let handle = &state.config.instagram_handle;
    let card = match select_featured(&events, Utc::now()) {
        Some(event) => FeaturedCard::for_event(event, state.timezone, handle),
        None => FeaturedCard::placeholder(handle),
    };
    Ok(Json(card))
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    upcoming: Vec<Event>,
    past: Vec<Event>,
    skipped: Vec<String>,
}

pub async fn event_schedule(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let events = all_events(&state).await?;
    let schedule = partition(&events, Utc::now());
    Ok(Json(ScheduleResponse {
        upcoming: schedule.upcoming.into_iter().cloned().collect(),
        past: schedule.past.into_iter().cloned().collect(),
        skipped: schedule.skipped.into_iter().map(str::to_string).collect(),
    }))
}

pub async fn list_menu_items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MenuItem>>, ApiError> {
    let items = with_store(&state, |store| Ok(store.list_menu_items(true)?)).await?;
    Ok(Json(items))
}

pub async fn create_menu_item(
    State(state): State<Arc<AppState>>,
    Json(input): Json<MenuItemInput>,
) -> Result<(StatusCode, Json<MenuItem>), ApiError> {
    let new = validate_menu_item(&input)?;
    let item = with_store(&state, move |store| Ok(store.create_menu_item(&new)?)).await?;
    info!(id = %item.id, name = %item.name, "menu item created");
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize)]
pub struct MenuQuery {
    q: Option<String>,
}

pub async fn menu_sections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<Vec<MenuSection>>, ApiError> {
    let items = with_store(&state, |store| Ok(store.list_menu_items(false)?)).await?;
    let sections = menu::group_by_category(&items);
    let sections = match query.q.as_deref() {
        Some(q) => menu::search(sections, q),
        None => sections,
    };
    Ok(Json(sections))
}

pub async fn upload_event_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    image_key(&content_type, &body)?;

    let uploader = ImageUploader::from_config(&state.config)?;
    let url = uploader.upload(&content_type, body.to_vec()).await?;
    info!(%url, "event image uploaded");
    Ok(Json(json!({ "fileUrl": url })))
}
