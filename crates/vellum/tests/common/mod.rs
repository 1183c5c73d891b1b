#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use vellum::{
    CollectionView, Database, DatabaseConfig, PrimaryKey, RowChange, SectionChange, StorableObject,
    ViewListener, ViewSpec,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub age: u32,
}

impl StorableObject for User {
    const TYPE_ID: &'static str = "user";
    const VERSION: u32 = 1;
}

impl PrimaryKey for User {
    fn primary_key(&self) -> String {
        self.id.clone()
    }
}

pub fn user(id: &str, name: &str, age: u32) -> User {
    User {
        id: id.into(),
        name: name.into(),
        age,
    }
}

/// Adults and minors, each sorted by name.
pub struct UsersByAge;

impl CollectionView for UsersByAge {
    type Object = User;
    const VIEW_ID: &'static str = "users_by_age";
    const VERSION: u32 = 1;

    fn filter(&self, _key: &str, user: &User) -> Option<String> {
        Some(if user.age >= 18 { "adult" } else { "minor" }.to_string())
    }

    fn compare(&self, _k1: &str, a: &User, _k2: &str, b: &User) -> Ordering {
        a.name.cmp(&b.name)
    }

    fn all_groups(&self) -> Vec<String> {
        vec!["adult".into(), "minor".into()]
    }
}

/// Single-group view sorted by age, versioned by the caller.
pub fn by_age_spec(version: u32) -> Arc<ViewSpec<User>> {
    Arc::new(ViewSpec::new("by_age", version).with_compare(|_, a: &User, _, b: &User| a.age.cmp(&b.age)))
}

pub fn memory_db() -> Database {
    Database::in_memory(DatabaseConfig::default()).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin,
    Section(SectionChange),
    Row(RowChange),
    End,
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn rows(events: &[Event]) -> Vec<RowChange> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Row(row) => Some(row.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ViewListener for Recorder {
    fn begin_updates(&self) {
        self.events.lock().unwrap().push(Event::Begin);
    }

    fn did_change_section(&self, change: &SectionChange) {
        self.events.lock().unwrap().push(Event::Section(change.clone()));
    }

    fn did_change(&self, change: &RowChange) {
        self.events.lock().unwrap().push(Event::Row(change.clone()));
    }

    fn end_updates(&self) {
        self.events.lock().unwrap().push(Event::End);
    }
}
