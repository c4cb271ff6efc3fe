//! Predefined metas and datasets.

use serde_json::{Value, json};

use persisty_storage::meta::{Attr, AttrType, KeyConfig, StorageMeta};
use persisty_storage::types::Item;

/// Converts a JSON object literal into an item.
pub fn item(value: Value) -> Item {
    value
        .as_object()
        .cloned()
        .unwrap_or_else(|| panic!("fixture is not an object: {value}"))
}

/// A book fixture.
#[derive(Debug, Clone)]
pub struct BookFixture {
    /// Key.
    pub id: &'static str,
    /// Title.
    pub title: &'static str,
    /// Author.
    pub author: &'static str,
    /// Publication year.
    pub year: i64,
    /// Genre; some books have none.
    pub genre: Option<&'static str>,
    /// Average rating.
    pub rating: f64,
}

impl BookFixture {
    /// Converts the fixture into an item, omitting absent values.
    pub fn to_item(&self) -> Item {
        let mut item = item(json!({
            "id": self.id,
            "title": self.title,
            "author": self.author,
            "year": self.year,
            "rating": self.rating,
        }));
        if let Some(genre) = self.genre {
            item.insert("genre".to_string(), json!(genre));
        }
        item
    }
}

/// The book dataset shared by parity and pagination tests.
pub fn books() -> Vec<BookFixture> {
    vec![
        BookFixture { id: "b01", title: "Dune", author: "Frank Herbert", year: 1965, genre: Some("scifi"), rating: 4.6 },
        BookFixture { id: "b02", title: "Neuromancer", author: "William Gibson", year: 1984, genre: Some("scifi"), rating: 4.1 },
        BookFixture { id: "b03", title: "The Hobbit", author: "J. R. R. Tolkien", year: 1937, genre: Some("fantasy"), rating: 4.7 },
        BookFixture { id: "b04", title: "Beloved", author: "Toni Morrison", year: 1987, genre: None, rating: 4.2 },
        BookFixture { id: "b05", title: "Kindred", author: "Octavia E. Butler", year: 1979, genre: Some("scifi"), rating: 4.4 },
        BookFixture { id: "b06", title: "Earthsea", author: "Ursula K. Le Guin", year: 1968, genre: Some("fantasy"), rating: 4.3 },
        BookFixture { id: "b07", title: "Ubik", author: "Philip K. Dick", year: 1969, genre: Some("scifi"), rating: 4.1 },
        BookFixture { id: "b08", title: "Middlemarch", author: "George Eliot", year: 1871, genre: None, rating: 4.0 },
        BookFixture { id: "b09", title: "Solaris", author: "Stanislaw Lem", year: 1961, genre: Some("scifi"), rating: 4.0 },
        BookFixture { id: "b10", title: "Gormenghast", author: "Mervyn Peake", year: 1950, genre: Some("fantasy"), rating: 3.9 },
    ]
}

/// Meta for the book dataset.
pub fn books_meta(batch_size: usize) -> StorageMeta {
    StorageMeta::builder("books")
        .attr(Attr::string("id"))
        .attr(Attr::string("title").max_length(100))
        .attr(Attr::string("author"))
        .attr(Attr::int("year"))
        .attr(Attr::string("genre").nullable())
        .attr(Attr::new("rating", AttrType::Float))
        .key_config(KeyConfig::attr("id"))
        .batch_size(batch_size)
        .build()
        .unwrap_or_else(|e| panic!("invalid books meta: {e}"))
}

/// Meta used by the year scenario: `{id, year}` records.
pub fn years_meta() -> StorageMeta {
    StorageMeta::builder("years")
        .attr(Attr::string("id"))
        .attr(Attr::int("year"))
        .batch_size(10)
        .build()
        .unwrap_or_else(|e| panic!("invalid years meta: {e}"))
}

/// The three records of the year scenario.
pub fn years() -> Vec<Item> {
    vec![
        item(json!({"id": "a", "year": 1960})),
        item(json!({"id": "b", "year": 1970})),
        item(json!({"id": "c", "year": 1980})),
    ]
}
