#![allow(dead_code)]

use lokidb::errors::LokiResult;
use lokidb::{doc, Collection, CollectionOptions, Document};

/// Builds a fixture, runs the test body against it and fails with the
/// error message if either step returns an error.
pub fn run_test<T, B, F>(before: B, test: F)
where
    B: FnOnce() -> LokiResult<T>,
    F: FnOnce(T) -> LokiResult<()>,
{
    let fixture = match before() {
        Ok(fixture) => fixture,
        Err(err) => panic!("Fixture setup failed: {}", err),
    };
    if let Err(err) = test(fixture) {
        panic!("Test failed: {:?}", err);
    }
}

pub fn ids(docs: &[Document]) -> Vec<i64> {
    docs.iter().filter_map(Document::id).collect()
}

pub fn names(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .filter_map(|doc| doc.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

/// Four weapons; binary index and unique index on `name`.
pub fn create_weapons() -> LokiResult<Collection> {
    let mut weapons = Collection::new(
        "weapons",
        CollectionOptions::new().index("name").unique("name"),
    );
    weapons.insert(vec![
        doc! { name: "mjolnir", owner: "thor", maker: "dwarves", weight: 20, tags: ["hammer", "thunder"] },
        doc! { name: "gungnir", owner: "odin", maker: "dwarves", weight: 5, tags: ["spear"] },
        doc! { name: "tyrfing", owner: "svafrlami", maker: "dwarves", weight: 10, tags: ["sword", "cursed"] },
        doc! { name: "draupnir", owner: "odin", maker: "elves", weight: 1, tags: ["ring"] },
    ])?;
    Ok(weapons)
}

/// Users with a unique `username` and a binary index on `age`.
pub fn create_users() -> LokiResult<Collection> {
    let mut users = Collection::new(
        "users",
        CollectionOptions::new().unique("username").index("age"),
    );
    users.insert(vec![
        doc! { username: "joe", age: 39, lang: "rust", address: { city: "oslo", zip: 1001 } },
        doc! { username: "jack", age: 20, lang: "go", address: { city: "bergen", zip: 5003 } },
        doc! { username: "jim", age: 30, lang: "rust", address: { city: "oslo", zip: 1002 } },
        doc! { username: "dave", age: 25, lang: "java", address: { city: "tromso", zip: 9008 } },
        doc! { username: "tim", age: 30, lang: "rust", address: { city: "bergen", zip: 5004 } },
    ])?;
    Ok(users)
}
