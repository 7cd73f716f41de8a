use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{MenuItem, NewMenuItem};

pub const UNCATEGORIZED: &str = "Uncategorized";

static HOUSE_MENU: &str = include_str!("../data/house_menu.json");

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MenuSection {
    pub category: String,
    pub items: Vec<MenuItem>,
}

/// Sections come out in the order their category is first seen.
pub fn group_by_category(items: &[MenuItem]) -> Vec<MenuSection> {
    let mut sections: Vec<MenuSection> = Vec::new();
    for item in items {
        let category = item
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED);
        match sections.iter_mut().find(|s| s.category == category) {
            Some(section) => section.items.push(item.clone()),
            None => sections.push(MenuSection {
                category: category.to_string(),
                items: vec![item.clone()],
            }),
        }
    }
    sections
}

/// Case-insensitive match on name or description; empty sections are dropped.
pub fn search(sections: Vec<MenuSection>, query: &str) -> Vec<MenuSection> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return sections;
    }
    sections
        .into_iter()
        .filter_map(|mut section| {
            section.items.retain(|item| {
                item.name.to_lowercase().contains(&needle)
                    || item
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            });
            (!section.items.is_empty()).then_some(section)
        })
        .collect()
}

#[derive(Deserialize, Debug)]
struct SeedSection {
    category: String,
    items: Vec<SeedItem>,
}

#[derive(Deserialize, Debug)]
struct SeedItem {
    name: Option<String>,
    description: Option<String>,
    price: Option<String>,
}

/// The bundled house menu, minus entries lacking a name or price.
pub fn house_menu() -> Result<Vec<NewMenuItem>> {
    let sections: Vec<SeedSection> =
        serde_json::from_str(HOUSE_MENU).context("bundled house menu is not valid json")?;
    Ok(seed_items(sections))
}

fn seed_items(sections: Vec<SeedSection>) -> Vec<NewMenuItem> {
    let mut out = Vec::new();
    for section in sections {
        for item in section.items {
            let name = item.name.filter(|n| !n.trim().is_empty());
            let price = item.price.filter(|p| !p.trim().is_empty());
            let (Some(name), Some(price)) = (name, price) else {
                warn!(category = %section.category, "skipping menu item without name or price");
                continue;
            };
            out.push(NewMenuItem {
                name,
                description: item.description.filter(|d| !d.trim().is_empty()),
                price,
                image_url: None,
                category: Some(section.category.clone()),
            });
        }
    }
    out
}
