use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::models::{Event, EventChanges, MenuItem, NewEvent, NewMenuItem, TagInput};
use crate::schedule::{normalize_tags, parse_event_date, TagField};
use crate::utils;

const EVENT_COLUMNS: &str =
    "id, title, date, time, djs, specials, image_url, featured, created_at, updated_at";
const MENU_COLUMNS: &str = "id, name, description, price, image_url, category, created_at, updated_at";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT,
                djs TEXT NOT NULL DEFAULT '[]',
                specials TEXT NOT NULL DEFAULT '[]',
                image_url TEXT,
                featured INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS menu_items(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                price TEXT NOT NULL,
                image_url TEXT,
                category TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// `BEGIN IMMEDIATE`: read-then-write sequences must hold the write lock
    /// from the start or SQLite answers `SQLITE_BUSY` without waiting.
    fn write_tx(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
    }

    /// All events, latest date first. Rows with an unreadable date sort last.
    pub fn list_events(&self) -> rusqlite::Result<Vec<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY rowid"))?;
        let rows = stmt.query_map([], event_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.sort_by_cached_key(|event| std::cmp::Reverse(parse_event_date(&event.date)));
        Ok(out)
    }

    pub fn get_event(&self, id: &str) -> rusqlite::Result<Event> {
        fetch_event(&self.conn, id)
    }

    pub fn create_event(&mut self, new: &NewEvent) -> rusqlite::Result<Event> {
        let now = Utc::now().to_rfc3339();
        let event = Event {
            id: Uuid::new_v4().to_string(),
            title: new.title.clone(),
            date: new.date.clone(),
            time: new.time.clone(),
            djs: new.djs.clone(),
            specials: new.specials.clone(),
            image_url: new.image_url.clone(),
            featured: new.featured,
            created_at: now.clone(),
            updated_at: now,
        };

        let tx = self.write_tx()?;
        tx.execute(
            &format!(
                "INSERT INTO events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                event.id,
                event.title,
                event.date,
                event.time,
                tags_to_json(&event.djs),
                tags_to_json(&event.specials),
                event.image_url,
                event.featured,
                event.created_at,
                event.updated_at
            ],
        )?;
        if event.featured {
            feature_only(&tx, &event.id, &event.updated_at)?;
        }
        tx.commit()?;
        Ok(event)
    }

    /// Applies `changes` to an existing row. A missing id is `QueryReturnedNoRows`.
    pub fn update_event(&mut self, id: &str, changes: &EventChanges) -> rusqlite::Result<Event> {
        let tx = self.write_tx()?;
        let mut event = fetch_event(&tx, id)?;

        if let Some(title) = &changes.title {
            event.title = title.clone();
        }
        if let Some(date) = &changes.date {
            event.date = date.clone();
        }
        if let Some(time) = &changes.time {
            event.time = Some(time.clone());
        }
        if let Some(djs) = &changes.djs {
            event.djs = djs.clone();
        }
        if let Some(specials) = &changes.specials {
            event.specials = specials.clone();
        }
        if let Some(image_url) = &changes.image_url {
            event.image_url = image_url.clone();
        }
        if let Some(featured) = changes.featured {
            event.featured = featured;
        }
        event.updated_at = Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE events SET title = ?2, date = ?3, time = ?4, djs = ?5, specials = ?6,
               image_url = ?7, featured = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                event.id,
                event.title,
                event.date,
                event.time,
                tags_to_json(&event.djs),
                tags_to_json(&event.specials),
                event.image_url,
                event.featured,
                event.updated_at
            ],
        )?;
        if changes.featured == Some(true) {
            feature_only(&tx, &event.id, &event.updated_at)?;
        }
        tx.commit()?;
        Ok(event)
    }

    /// Flags `id` and clears every other row in one transaction.
    pub fn set_featured(&mut self, id: &str) -> rusqlite::Result<Event> {
        let now = Utc::now().to_rfc3339();
        let tx = self.write_tx()?;
        fetch_event(&tx, id)?;
        feature_only(&tx, id, &now)?;
        let event = fetch_event(&tx, id)?;
        tx.commit()?;
        Ok(event)
    }

    pub fn delete_event(&self, id: &str) -> rusqlite::Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    /// Newest first, or insertion order when `newest_first` is false.
    pub fn list_menu_items(&self, newest_first: bool) -> rusqlite::Result<Vec<MenuItem>> {
        let order = if newest_first {
            "created_at DESC, rowid DESC"
        } else {
            "created_at ASC, rowid ASC"
        };
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {MENU_COLUMNS} FROM menu_items ORDER BY {order}"))?;
        let rows = stmt.query_map([], menu_item_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn create_menu_item(&self, new: &NewMenuItem) -> rusqlite::Result<MenuItem> {
        insert_menu_item(&self.conn, new, &Utc::now().to_rfc3339())
    }

    /// Swaps the whole menu for `items` atomically.
    pub fn replace_menu(&mut self, items: &[NewMenuItem]) -> rusqlite::Result<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.write_tx()?;
        tx.execute("DELETE FROM menu_items", [])?;
        for item in items {
            insert_menu_item(&tx, item, &now)?;
        }
        tx.commit()?;
        Ok(items.len())
    }
}

fn fetch_event(conn: &Connection, id: &str) -> rusqlite::Result<Event> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
        params![id],
        event_from_row,
    )
}

fn feature_only(conn: &Connection, id: &str, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE events SET featured = (id = ?1), updated_at = ?2
         WHERE featured != (id = ?1)",
        params![id, now],
    )?;
    Ok(())
}

fn insert_menu_item(conn: &Connection, new: &NewMenuItem, now: &str) -> rusqlite::Result<MenuItem> {
    let item = MenuItem {
        id: Uuid::new_v4().to_string(),
        name: new.name.clone(),
        description: new.description.clone(),
        price: new.price.clone(),
        image_url: new.image_url.clone(),
        category: new.category.clone(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    };
    conn.execute(
        &format!("INSERT INTO menu_items ({MENU_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            item.id,
            item.name,
            item.description,
            item.price,
            item.image_url,
            item.category,
            item.created_at,
            item.updated_at
        ],
    )?;
    Ok(item)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let djs: Option<String> = row.get(4)?;
    let specials: Option<String> = row.get(5)?;
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        date: row.get(2)?,
        time: row.get(3)?,
        djs: tags_from_column(djs, TagField::Djs),
        specials: tags_from_column(specials, TagField::Specials),
        image_url: row.get(6)?,
        featured: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn menu_item_from_row(row: &Row<'_>) -> rusqlite::Result<MenuItem> {
    Ok(MenuItem {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        image_url: row.get(4)?,
        category: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn tags_to_json(tags: &[String]) -> String {
    serde_json::Value::from(tags.to_vec()).to_string()
}

/// Columns hold JSON arrays; rows imported from the old site may still carry
/// a delimited string instead.
fn tags_from_column(value: Option<String>, field: TagField) -> Vec<String> {
    let Some(text) = value else {
        return Vec::new();
    };
    let raw = serde_json::from_str::<Vec<String>>(&text)
        .map(TagInput::List)
        .unwrap_or(TagInput::Text(text));
    normalize_tags(Some(&raw), field)
}

/// True when a store error means the row does not exist.
pub fn is_not_found(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::QueryReturnedNoRows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().expect("tempdir");
        let store = Store::open(&dir.path().join("cantina.sqlite")).expect("open store");
        (dir, store)
    }

    fn new_event(title: &str, date: &str, featured: bool) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            date: date.to_string(),
            time: Some("21:00".to_string()),
            djs: vec!["DJ A".to_string(), "DJ B".to_string()],
            specials: vec!["$5 Palomas".to_string()],
            image_url: None,
            featured,
        }
    }

    fn featured_ids(store: &Store) -> Vec<String> {
        store
            .list_events()
            .unwrap()
            .into_iter()
            .filter(|e| e.featured)
            .map(|e| e.id)
            .collect()
    }

    #[test]
    fn create_and_read_back() {
        let (_dir, mut store) = store();
        let created = store
            .create_event(&new_event("Cumbia", "2024-05-04T00:00:00+00:00", false))
            .unwrap();
        let fetched = store.get_event(&created.id).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.djs, vec!["DJ A", "DJ B"]);
    }

    #[test]
    fn events_list_latest_date_first() {
        let (_dir, mut store) = store();
        store.create_event(&new_event("old", "2024-01-01T00:00:00+00:00", false)).unwrap();
        store.create_event(&new_event("new", "2024-06-01T00:00:00+00:00", false)).unwrap();
        store.create_event(&new_event("mid", "2024-03-01T00:00:00+00:00", false)).unwrap();
        let titles: Vec<_> = store.list_events().unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }

    #[test]
    fn featuring_one_clears_the_rest() {
        let (_dir, mut store) = store();
        let a = store.create_event(&new_event("a", "2024-05-01T00:00:00+00:00", true)).unwrap();
        let b = store.create_event(&new_event("b", "2024-05-02T00:00:00+00:00", true)).unwrap();
        assert_eq!(featured_ids(&store), vec![b.id.clone()]);

        let changes = EventChanges {
            featured: Some(true),
            ..Default::default()
        };
        store.update_event(&a.id, &changes).unwrap();
        assert_eq!(featured_ids(&store), vec![a.id.clone()]);

        store.set_featured(&b.id).unwrap();
        assert_eq!(featured_ids(&store), vec![b.id]);
    }

    #[test]
    fn update_applies_only_present_fields() {
        let (_dir, mut store) = store();
        let created = store
            .create_event(&new_event("a", "2024-05-01T00:00:00+00:00", false))
            .unwrap();
        let changes = EventChanges {
            title: Some("renamed".into()),
            image_url: Some(Some("https://img.example.com/x.png".into())),
            ..Default::default()
        };
        let updated = store.update_event(&created.id, &changes).unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.date, created.date);
        assert_eq!(updated.djs, created.djs);
        assert_eq!(updated.image_url.as_deref(), Some("https://img.example.com/x.png"));

        let cleared = EventChanges {
            image_url: Some(None),
            ..Default::default()
        };
        assert_eq!(store.update_event(&created.id, &cleared).unwrap().image_url, None);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let (_dir, mut store) = store();
        let changes = EventChanges {
            title: Some("x".into()),
            ..Default::default()
        };
        assert!(is_not_found(&store.update_event("nope", &changes).unwrap_err()));
        assert!(is_not_found(&store.delete_event("nope").unwrap_err()));
        assert!(is_not_found(&store.set_featured("nope").unwrap_err()));
        assert!(is_not_found(&store.get_event("nope").unwrap_err()));
    }

    #[test]
    fn legacy_delimited_tags_are_normalized() {
        let (_dir, store) = store();
        store
            .conn
            .execute(
                "INSERT INTO events (id, title, date, djs, specials, created_at, updated_at)
                 VALUES ('legacy', 'Old', '2023-01-01', 'DJ A, , DJ B', 'Tacos; Beer', '', '')",
                [],
            )
            .unwrap();
        let event = store.get_event("legacy").unwrap();
        assert_eq!(event.djs, vec!["DJ A", "DJ B"]);
        assert_eq!(event.specials, vec!["Tacos", "Beer"]);
        assert!(!event.featured);
    }

    #[test]
    fn concurrent_featured_writes_do_not_fail() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let (dir, mut store) = store();
        let path = dir.path().join("cantina.sqlite");
        let ids: Vec<String> = (0..4)
            .map(|n| {
                store
                    .create_event(&new_event(&format!("e{n}"), "2024-05-01T00:00:00+00:00", false))
                    .unwrap()
                    .id
            })
            .collect();

        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|n| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                let id = ids[n % ids.len()].clone();
                thread::spawn(move || {
                    let mut store = Store::open(&path).unwrap();
                    let changes = EventChanges {
                        featured: Some(true),
                        ..Default::default()
                    };
                    let mut failures = 0;
                    for round in 0..20 {
                        barrier.wait();
                        let result = if round % 2 == 0 {
                            store.update_event(&id, &changes).map(|_| ())
                        } else {
                            store.set_featured(&id).map(|_| ())
                        };
                        if result.is_err() {
                            failures += 1;
                        }
                    }
                    failures
                })
            })
            .collect();

        let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(failures, 0);
        assert_eq!(featured_ids(&store).len(), 1);
    }

    #[test]
    fn menu_replace_and_list() {
        let (_dir, mut store) = store();
        let item = |name: &str| NewMenuItem {
            name: name.into(),
            description: None,
            price: "$1.00".into(),
            image_url: None,
            category: Some("Tacos".into()),
        };
        store.create_menu_item(&item("stale")).unwrap();
        let count = store.replace_menu(&[item("first"), item("second")]).unwrap();
        assert_eq!(count, 2);

        let in_order: Vec<_> = store.list_menu_items(false).unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(in_order, vec!["first", "second"]);
        let newest: Vec<_> = store.list_menu_items(true).unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(newest, vec!["second", "first"]);
    }
}
