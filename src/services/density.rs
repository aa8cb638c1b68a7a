use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::CatalogError;
use crate::models::DensityEntry;

pub const DEFAULT_KEY: &str = "default";

const GOOGLE_SHEETS_EXPORT_URL: &str = "https://docs.google.com/spreadsheets/d";

/// Where the density table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DensitySource {
    Builtin,
    JsonFile(PathBuf),
    CsvFile(PathBuf),
    /// URL serving the table as CSV (a Google Sheets id resolves to its CSV export).
    Remote(String),
}

impl DensitySource {
    pub fn parse(source: &str) -> Result<Self, CatalogError> {
        let source = source.trim();
        let lower = source.to_lowercase();

        if lower.is_empty() || lower == "builtin" {
            return Ok(DensitySource::Builtin);
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(DensitySource::Remote(source.to_string()));
        }
        if lower.ends_with(".json") {
            return Ok(DensitySource::JsonFile(PathBuf::from(source)));
        }
        if lower.ends_with(".csv") {
            return Ok(DensitySource::CsvFile(PathBuf::from(source)));
        }
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            return Err(CatalogError::Unsupported(format!(
                "{} (spreadsheet files are not supported, export the sheet as CSV)",
                source
            )));
        }
        if is_sheet_id(source) {
            return Ok(DensitySource::Remote(format!(
                "{}/{}/export?format=csv",
                GOOGLE_SHEETS_EXPORT_URL, source
            )));
        }

        Err(CatalogError::Unsupported(source.to_string()))
    }
}

fn is_sheet_id(source: &str) -> bool {
    source.len() >= 20
        && source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonCatalog {
    Map(HashMap<String, JsonEntry>),
    List(Vec<JsonRow>),
}

#[derive(Deserialize)]
struct JsonEntry {
    #[serde(default)]
    name: Option<String>,
    density: f64,
}

#[derive(Deserialize)]
struct JsonRow {
    food_type: String,
    #[serde(default)]
    name: Option<String>,
    density: f64,
}

/// Lookup table from food type to density, read-only once built.
#[derive(Debug, Clone)]
pub struct DensityCatalog {
    origin: String,
    entries: HashMap<String, DensityEntry>,
    fallback: DensityEntry,
}

impl DensityCatalog {
    pub fn builtin() -> Self {
        let rows = [
            ("apple", "apple", 0.6),
            ("banana", "banana", 0.5),
            ("rice", "rice", 0.75),
            ("chicken", "chicken", 1.0),
            ("pasta", "pasta", 0.4),
            ("salad", "salad", 0.3),
            (DEFAULT_KEY, "unknown", 0.8),
        ];

        let entries: HashMap<String, DensityEntry> = rows
            .iter()
            .map(|(key, name, density)| (key.to_string(), DensityEntry::new(*name, *density)))
            .collect();
        let fallback = entries[DEFAULT_KEY].clone();

        Self {
            origin: "builtin".to_string(),
            entries,
            fallback,
        }
    }

    /// Builds a catalog from `(food_type, canonical_name, density)` rows.
    ///
    /// Keys are normalized the same way [`DensityCatalog::query`] normalizes input.
    /// A table without a `default` row gets the built-in fallback entry.
    pub fn from_rows<I>(origin: impl Into<String>, rows: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (String, String, f64)>,
    {
        let origin = origin.into();
        let mut entries = HashMap::new();

        for (key, name, density) in rows {
            let key = normalize_key(&key);
            if key.is_empty() {
                continue;
            }
            if !density.is_finite() || density <= 0.0 {
                return Err(CatalogError::InvalidDensity {
                    origin,
                    key,
                    density,
                });
            }
            let name = if name.trim().is_empty() {
                key.clone()
            } else {
                name.trim().to_string()
            };
            entries.insert(key, DensityEntry::new(name, density));
        }

        let fallback = match entries.get(DEFAULT_KEY) {
            Some(entry) => entry.clone(),
            None => {
                let entry = Self::builtin().fallback;
                log::warn!(
                    "⚠️ Density database {} has no '{}' row, using {} ({} g/ml)",
                    origin,
                    DEFAULT_KEY,
                    entry.canonical_name,
                    entry.density_g_per_ml
                );
                entries.insert(DEFAULT_KEY.to_string(), entry.clone());
                entry
            }
        };

        Ok(Self {
            origin,
            entries,
            fallback,
        })
    }

    pub async fn load(source: &DensitySource) -> Result<Self, CatalogError> {
        match source {
            DensitySource::Builtin => Ok(Self::builtin()),
            DensitySource::JsonFile(path) => {
                let text = read_file(path)?;
                Self::from_json(&path.display().to_string(), &text)
            }
            DensitySource::CsvFile(path) => {
                let text = read_file(path)?;
                Self::from_csv(&path.display().to_string(), &text)
            }
            DensitySource::Remote(url) => {
                log::info!("🌐 Fetching density database from {}", url);
                let text = fetch_text(url)
                    .await
                    .map_err(|source| CatalogError::Fetch {
                        url: url.clone(),
                        source,
                    })?;
                Self::from_csv(url, &text)
            }
        }
    }

    /// Accepts either `{"apple": {"name": "apple", "density": 0.6}, ...}` or
    /// `[{"food_type": "apple", "name": "apple", "density": 0.6}, ...]`.
    pub fn from_json(origin: &str, text: &str) -> Result<Self, CatalogError> {
        let parsed: JsonCatalog =
            serde_json::from_str(text).map_err(|e| CatalogError::Parse {
                origin: origin.to_string(),
                reason: e.to_string(),
            })?;

        let rows: Vec<(String, String, f64)> = match parsed {
            JsonCatalog::Map(map) => map
                .into_iter()
                .map(|(key, entry)| {
                    let name = entry.name.unwrap_or_else(|| key.clone());
                    (key, name, entry.density)
                })
                .collect(),
            JsonCatalog::List(list) => list
                .into_iter()
                .map(|row| {
                    let name = row.name.unwrap_or_else(|| row.food_type.clone());
                    (row.food_type, name, row.density)
                })
                .collect(),
        };

        Self::from_rows(origin, rows)
    }

    /// Rows are `food_type,name,density` or `food_type,density`. A header row,
    /// blank lines and `#` comments are skipped.
    pub fn from_csv(origin: &str, text: &str) -> Result<Self, CatalogError> {
        let mut rows = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line
                .split(',')
                .map(|f| f.trim().trim_matches('"').trim())
                .collect();

            let (key, name, density) = match fields.as_slice() {
                [key, density] => (*key, *key, *density),
                [key, name, density, ..] => (*key, *name, *density),
                _ => {
                    return Err(CatalogError::Parse {
                        origin: origin.to_string(),
                        reason: format!("line {} has fewer than two columns", index + 1),
                    })
                }
            };

            match density.parse::<f64>() {
                Ok(density) => rows.push((key.to_string(), name.to_string(), density)),
                // Header row
                Err(_) if rows.is_empty() && index == first_content_line(text) => continue,
                Err(_) => {
                    return Err(CatalogError::Parse {
                        origin: origin.to_string(),
                        reason: format!("line {}: {:?} is not a number", index + 1, density),
                    })
                }
            }
        }

        Self::from_rows(origin, rows)
    }

    /// Case-insensitive lookup. Unknown food types resolve to the `default` entry.
    pub fn query(&self, food_type: &str) -> &DensityEntry {
        self.entries
            .get(normalize_key(food_type).as_str())
            .unwrap_or(&self.fallback)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn normalize_key(food_type: &str) -> String {
    food_type.trim().to_lowercase()
}

fn first_content_line(text: &str) -> usize {
    text.lines()
        .position(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
        .unwrap_or(0)
}

fn read_file(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn fetch_text(url: &str) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    client.get(url).send().await?.error_for_status()?.text().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_query_is_case_insensitive() {
        let catalog = DensityCatalog::builtin();
        assert_eq!(catalog.query("APPLE"), catalog.query("apple"));
        assert_eq!(catalog.query("  Apple "), &DensityEntry::new("apple", 0.6));
    }

    #[test]
    fn test_unknown_food_falls_back_to_default() {
        let catalog = DensityCatalog::builtin();
        let entry = catalog.query("zucchini");
        assert_eq!(entry.canonical_name, "unknown");
        assert_eq!(entry.density_g_per_ml, 0.8);
        assert_eq!(catalog.query(""), entry);
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!(DensitySource::parse("builtin").unwrap(), DensitySource::Builtin);
        assert_eq!(DensitySource::parse("").unwrap(), DensitySource::Builtin);
        assert_eq!(
            DensitySource::parse("data/densities.json").unwrap(),
            DensitySource::JsonFile(PathBuf::from("data/densities.json"))
        );
        assert_eq!(
            DensitySource::parse("data/densities.CSV").unwrap(),
            DensitySource::CsvFile(PathBuf::from("data/densities.CSV"))
        );
        assert_eq!(
            DensitySource::parse("https://example.com/db.csv").unwrap(),
            DensitySource::Remote("https://example.com/db.csv".to_string())
        );
        assert_eq!(
            DensitySource::parse("1AbCdEfGhIjKlMnOpQrStUvWxYz_-0123").unwrap(),
            DensitySource::Remote(
                "https://docs.google.com/spreadsheets/d/1AbCdEfGhIjKlMnOpQrStUvWxYz_-0123/export?format=csv"
                    .to_string()
            )
        );
        assert!(matches!(
            DensitySource::parse("models/density_db.xlsx"),
            Err(CatalogError::Unsupported(_))
        ));
        assert!(matches!(
            DensitySource::parse("densities.txt"),
            Err(CatalogError::Unsupported(_))
        ));
    }

    #[test]
    fn test_csv_with_header_and_aliases() {
        let text = "food_type,name,density\n\
                    # aliases\n\
                    Granny Smith,apple,0.62\n\
                    \"bread\",\"white bread\",0.25\n\
                    tofu,1.05\n\
                    default,unknown,0.9\n";
        let catalog = DensityCatalog::from_csv("test.csv", text).unwrap();

        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.query("granny smith"), &DensityEntry::new("apple", 0.62));
        assert_eq!(catalog.query("BREAD"), &DensityEntry::new("white bread", 0.25));
        assert_eq!(catalog.query("tofu"), &DensityEntry::new("tofu", 1.05));
        assert_eq!(catalog.query("zucchini"), &DensityEntry::new("unknown", 0.9));
    }

    #[test]
    fn test_csv_bad_number_after_header() {
        let text = "food_type,density\napple,heavy\n";
        assert!(matches!(
            DensityCatalog::from_csv("test.csv", text),
            Err(CatalogError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_default_row_gets_fallback() {
        let catalog = DensityCatalog::from_rows(
            "inline",
            vec![("Soup".to_string(), "soup".to_string(), 1.02)],
        )
        .unwrap();

        assert_eq!(catalog.query("soup").density_g_per_ml, 1.02);
        assert_eq!(catalog.query("default"), &DensityEntry::new("unknown", 0.8));
        assert_eq!(catalog.query("nothing"), &DensityEntry::new("unknown", 0.8));
    }

    #[test]
    fn test_non_positive_density_rejected() {
        let result = DensityCatalog::from_rows(
            "inline",
            vec![("air".to_string(), "air".to_string(), 0.0)],
        );
        assert!(matches!(
            result,
            Err(CatalogError::InvalidDensity { ref key, .. }) if key == "air"
        ));
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"Apple": {{"name": "apple", "density": 0.6}}, "honey": {{"density": 1.42}}}}"#
        )
        .unwrap();

        let source = DensitySource::parse(file.path().to_str().unwrap()).unwrap();
        let catalog = DensityCatalog::load(&source).await.unwrap();

        assert_eq!(catalog.query("apple"), &DensityEntry::new("apple", 0.6));
        assert_eq!(catalog.query("Honey"), &DensityEntry::new("honey", 1.42));
        assert_eq!(catalog.query("x").canonical_name, "unknown");
    }

    #[test]
    fn test_json_list_format() {
        let text = r#"[{"food_type": "rice", "name": "cooked rice", "density": 0.75}]"#;
        let catalog = DensityCatalog::from_json("list.json", text).unwrap();
        assert_eq!(catalog.query("RICE").canonical_name, "cooked rice");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let source = DensitySource::CsvFile(PathBuf::from("/nonexistent/densities.csv"));
        assert!(matches!(
            DensityCatalog::load(&source).await,
            Err(CatalogError::Io { .. })
        ));
    }

    #[cfg(feature = "http-server")]
    #[tokio::test]
    async fn test_load_remote_csv() {
        use axum::{routing::get, Router};

        let app = Router::new().route(
            "/db.csv",
            get(|| async { "food_type,name,density\nmango,mango,0.65\n" }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = DensitySource::parse(&format!("http://{}/db.csv", addr)).unwrap();
        let catalog = DensityCatalog::load(&source).await.unwrap();

        assert_eq!(catalog.query("Mango"), &DensityEntry::new("mango", 0.65));
        assert_eq!(catalog.query("default").canonical_name, "unknown");

        let missing = DensitySource::parse(&format!("http://{}/missing.csv", addr)).unwrap();
        assert!(matches!(
            DensityCatalog::load(&missing).await,
            Err(CatalogError::Fetch { .. })
        ));
    }
}
