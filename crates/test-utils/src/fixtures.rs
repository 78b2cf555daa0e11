//! Common fixtures for pipeline tests.

/// Bounding boxes as (min_lon, min_lat, max_lon, max_lat).
pub mod bbox {
    /// A small box around Delhi. Inside the real h24v06; the documented
    /// indexing puts it in h25v06.
    pub const DELHI: (f64, f64, f64, f64) = (77.0, 28.5, 77.2, 28.7);

    /// Straddles the real h24/h25 boundary, which runs near 79.5°E at 28°N.
    pub const H24_H25_BOUNDARY: (f64, f64, f64, f64) = (79.0, 28.0, 80.0, 28.5);

    /// Straddles the h25/h26 boundary of the documented indexing near 80°E.
    pub const H25_H26_BOUNDARY: (f64, f64, f64, f64) = (79.5, 28.0, 80.5, 28.5);
}

/// Granule names.
pub mod granules {
    pub const SHORT_NAME: &str = "MOD13Q1";
    pub const VERSION: &str = "061";

    pub const H25V06_NAME: &str = "MOD13Q1.A2023209.h25v06.061.2023226000000.hdf";
    pub const H26V06_NAME: &str = "MOD13Q1.A2023209.h26v06.061.2023226000000.hdf";
}

/// Catalog search responses.
pub mod catalog {
    use serde_json::{json, Value};

    /// A search response with one entry per href.
    pub fn feed(hrefs: &[&str]) -> Value {
        let entries: Vec<Value> = hrefs
            .iter()
            .map(|href| {
                json!({
                    "title": href.rsplit('/').next().unwrap_or(href),
                    "links": [
                        { "href": href, "rel": "http://esipfed.org/ns/fedsearch/1.1/data#" }
                    ]
                })
            })
            .collect();
        json!({ "feed": { "entry": entries } })
    }

    /// An empty search response.
    pub fn empty_feed() -> Value {
        json!({ "feed": { "entry": [] } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_shape() {
        let feed = catalog::feed(&["https://example.com/a.hdf", "https://example.com/b.hdf"]);
        let entries = feed["feed"]["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["links"][0]["href"], "https://example.com/b.hdf");
        assert_eq!(entries[0]["title"], "a.hdf");
    }

    #[test]
    fn test_empty_feed() {
        assert!(catalog::empty_feed()["feed"]["entry"].as_array().unwrap().is_empty());
    }
}
