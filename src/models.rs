use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    /// Stored as RFC 3339, but older rows may carry whatever the admin typed.
    pub date: String,
    pub time: Option<String>,
    #[serde(default)]
    pub djs: Vec<String>,
    #[serde(default)]
    pub specials: Vec<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Tag fields arrive either as a JSON array or as one delimited string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum TagInput {
    List(Vec<String>),
    Text(String),
}

/// Raw event body accepted by the create and update endpoints.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EventInput {
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub djs: Option<TagInput>,
    pub specials: Option<TagInput>,
    pub image_url: Option<String>,
    pub featured: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub date: String,
    pub time: Option<String>,
    pub djs: Vec<String>,
    pub specials: Vec<String>,
    pub image_url: Option<String>,
    pub featured: bool,
}

/// Fields to overwrite on an existing event. `None` leaves a column untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventChanges {
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub djs: Option<Vec<String>>,
    pub specials: Option<Vec<String>>,
    /// `Some(None)` clears the image.
    pub image_url: Option<Option<String>>,
    pub featured: Option<bool>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MenuItemInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewMenuItem {
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
}
