use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::category::CategoryRules;
use crate::domain::{Resource, ResourceKind};
use crate::error::MendError;
use crate::sanitize::sanitize;

/// One record as handed over by an enumerator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    /// Explicit subfolder, e.g. the book a chapter belongs to.
    #[serde(default)]
    pub folder: Option<String>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: Some(name.into()),
            url: url.into(),
            kind: Some(kind),
            folder: None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    /// Keep only these kinds; empty keeps everything.
    pub kinds: Vec<ResourceKind>,
    /// Case-insensitive substrings matched against name and folder; empty keeps everything.
    pub name_filters: Vec<String>,
    /// Group by keyword when set. Explicit folders always win.
    pub categories: Option<CategoryRules>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    resource: Resource,
    category: Option<String>,
}

impl CatalogItem {
    pub fn new(resource: Resource, category: Option<String>) -> Self {
        Self { resource, category }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// `<root>/[<category>/]<name>.<ext>`
    pub fn destination(&self, root: &Utf8Path) -> Utf8PathBuf {
        let dir = match &self.category {
            Some(category) => root.join(category),
            None => root.to_path_buf(),
        };
        dir.join(self.resource.file_name())
    }

    pub fn label(&self) -> String {
        match &self.category {
            Some(category) => format!("{category} / {}", self.resource.file_name()),
            None => self.resource.file_name(),
        }
    }
}

/// The ordered, URL-deduplicated set of resources a run works on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn build(
        entries: impl IntoIterator<Item = CatalogEntry>,
        options: &CatalogOptions,
    ) -> Result<Self, MendError> {
        let name_filters = options
            .name_filters
            .iter()
            .map(|pattern| pattern.trim().to_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for entry in entries {
            let (url, kind) = match resolve_link(&entry) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(
                        name = entry.name.as_deref().unwrap_or_default(),
                        "skipping entry: {err}"
                    );
                    continue;
                }
            };
            if !seen.insert(url.clone()) {
                debug!(%url, "duplicate resource url skipped");
                continue;
            }

            if !options.kinds.is_empty() && !options.kinds.contains(&kind) {
                continue;
            }

            let name = display_name(entry.name.as_deref(), &url);
            let category = match entry.folder.as_deref() {
                Some(folder) if !folder.trim().is_empty() => Some(sanitize(folder)),
                _ => options
                    .categories
                    .as_ref()
                    .map(|rules| sanitize(rules.detect(&name))),
            };

            if !name_filters.is_empty() {
                let haystack = format!(
                    "{} {}",
                    name.to_lowercase(),
                    category.as_deref().unwrap_or_default().to_lowercase()
                );
                if !name_filters.iter().any(|pattern| haystack.contains(pattern)) {
                    continue;
                }
            }

            items.push(CatalogItem::new(Resource::new(name, url, kind), category));
        }

        if items.is_empty() {
            return Err(MendError::EmptyCatalog);
        }
        for (first, second, file) in path_collisions(&items) {
            warn!(
                %first,
                %second,
                %file,
                "two resources map to the same file; the later one overwrites the earlier"
            );
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogItem;
    type IntoIter = std::slice::Iter<'a, CatalogItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Parses an absolute http(s) URL into the form used as identity key.
/// The fragment never reaches the server, so it is dropped.
pub fn normalize_url(raw: &str) -> Result<Url, MendError> {
    let mut url = Url::parse(raw.trim()).map_err(|_| MendError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MendError::InvalidUrl(raw.to_string()));
    }
    url.set_fragment(None);
    Ok(url)
}

/// Absolute URL plus its kind, or why the entry is not downloadable
/// (viewer pages, relative links, unknown extensions).
fn resolve_link(entry: &CatalogEntry) -> Result<(Url, ResourceKind), MendError> {
    let url = normalize_url(&entry.url)?;
    let kind = match entry.kind {
        Some(kind) => kind,
        None => ResourceKind::from_url(&url)
            .ok_or_else(|| MendError::UnknownKind(url.to_string()))?,
    };
    Ok((url, kind))
}

/// Sanitized display name, falling back to the URL's file stem when the
/// enumerator gave no usable label.
fn display_name(raw: Option<&str>, url: &Url) -> String {
    match raw.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => sanitize(name),
        None => {
            let segment = url
                .path_segments()
                .and_then(|segments| segments.last())
                .unwrap_or_default();
            let stem = segment
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(segment);
            sanitize(stem)
        }
    }
}

/// Items whose destination paths are identical, as `(first url, later url, label)`.
/// Names differing only in case are distinct paths here.
fn path_collisions(items: &[CatalogItem]) -> Vec<(&Url, &Url, String)> {
    let mut first_by_path: HashMap<(Option<&str>, String), &Url> = HashMap::new();
    let mut collisions = Vec::new();
    for item in items {
        let key = (item.category(), item.resource().file_name());
        match first_by_path.entry(key) {
            Entry::Occupied(first) => {
                collisions.push((*first.get(), item.resource().url(), item.label()));
            }
            Entry::Vacant(slot) => {
                slot.insert(item.resource().url());
            }
        }
    }
    collisions
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn first_seen_name_wins_on_duplicate_url() {
        let entries = vec![
            CatalogEntry::new("First", "https://nie.lk/a.pdf", ResourceKind::Pdf),
            CatalogEntry::new("Second", "https://NIE.lk/a.pdf#page=2", ResourceKind::Pdf),
            CatalogEntry::new("Other", "https://nie.lk/b.pdf", ResourceKind::Pdf),
        ];
        let catalog = Catalog::build(entries, &CatalogOptions::default()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.items()[0].resource().name(), "First");
        assert_eq!(catalog.items()[1].resource().name(), "Other");
    }

    #[test]
    fn kind_inferred_from_url() {
        let entry = CatalogEntry {
            name: None,
            url: "https://nie.lk/audio/Listening%20Test%201.MP3".to_string(),
            kind: None,
            folder: None,
        };
        let catalog = Catalog::build([entry], &CatalogOptions::default()).unwrap();
        let resource = catalog.items()[0].resource();
        assert_eq!(resource.kind(), ResourceKind::Mp3);
        assert_eq!(resource.name(), "Listening Test 1");
    }

    #[test]
    fn undownloadable_entries_are_skipped() {
        let entries = vec![
            CatalogEntry::new("Good", "https://nie.lk/good.pdf", ResourceKind::Pdf),
            CatalogEntry {
                name: Some("viewer".to_string()),
                url: "https://online.fliphtml5.com/abc/".to_string(),
                kind: None,
                folder: None,
            },
            CatalogEntry {
                name: Some("relative".to_string()),
                url: "/x.pdf".to_string(),
                kind: None,
                folder: None,
            },
            CatalogEntry::new("Ftp", "ftp://nie.lk/y.pdf", ResourceKind::Pdf),
            CatalogEntry::new("Also good", "https://nie.lk/also.mp3", ResourceKind::Mp3),
        ];
        let catalog = Catalog::build(entries, &CatalogOptions::default()).unwrap();
        let names = catalog
            .iter()
            .map(|item| item.resource().name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Good", "Also good"]);
    }

    #[test]
    fn only_undownloadable_entries_is_fatal() {
        let entry = CatalogEntry {
            name: Some("viewer".to_string()),
            url: "https://online.fliphtml5.com/abc/".to_string(),
            kind: None,
            folder: None,
        };
        let err = Catalog::build([entry], &CatalogOptions::default()).unwrap_err();
        assert_matches!(err, MendError::EmptyCatalog);
    }

    #[test]
    fn link_resolution_errors() {
        let viewer = CatalogEntry {
            name: None,
            url: "https://online.fliphtml5.com/abc/".to_string(),
            kind: None,
            folder: None,
        };
        assert_matches!(resolve_link(&viewer), Err(MendError::UnknownKind(_)));

        let relative = CatalogEntry::new("x", "/downloads/x.pdf", ResourceKind::Pdf);
        assert_matches!(resolve_link(&relative), Err(MendError::InvalidUrl(_)));
    }

    #[test]
    fn collisions_compare_exact_paths() {
        let entries = vec![
            CatalogEntry::new("Unit 1", "https://x.org/1.pdf", ResourceKind::Pdf),
            CatalogEntry::new("UNIT 1", "https://x.org/2.pdf", ResourceKind::Pdf),
            CatalogEntry::new("Unit: 1", "https://x.org/3.pdf", ResourceKind::Pdf),
            CatalogEntry::new("Unit_ 1", "https://x.org/4.pdf", ResourceKind::Pdf),
        ];
        let catalog = Catalog::build(entries, &CatalogOptions::default()).unwrap();
        let collisions = path_collisions(catalog.items());
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].0.as_str(), "https://x.org/3.pdf");
        assert_eq!(collisions[0].1.as_str(), "https://x.org/4.pdf");
        assert_eq!(collisions[0].2, "Unit_ 1.pdf");
    }

    #[test]
    fn destination_layout() {
        let entries = vec![
            CatalogEntry::new("Unit: 1/2", "https://x.org/1.pdf", ResourceKind::Pdf)
                .with_folder("Science Book"),
            CatalogEntry::new("Physics Notes", "https://x.org/2.pdf", ResourceKind::Pdf),
            CatalogEntry::new("Song", "https://x.org/3.wav", ResourceKind::Wav),
        ];
        let options = CatalogOptions {
            categories: Some(CategoryRules::default()),
            ..CatalogOptions::default()
        };
        let catalog = Catalog::build(entries, &options).unwrap();
        let root = Utf8Path::new("/data");
        assert_eq!(
            catalog.items()[0].destination(root),
            Utf8PathBuf::from("/data/Science Book/Unit_ 1_2.pdf")
        );
        assert_eq!(
            catalog.items()[1].destination(root),
            Utf8PathBuf::from("/data/Physics/Physics Notes.pdf")
        );
        assert_eq!(
            catalog.items()[2].destination(root),
            Utf8PathBuf::from("/data/Other/Song.wav")
        );
    }

    #[test]
    fn filters_by_kind_and_name() {
        let entries = vec![
            CatalogEntry::new("Biology Unit 1", "https://x.org/1.pdf", ResourceKind::Pdf),
            CatalogEntry::new("Chemistry Unit 1", "https://x.org/2.pdf", ResourceKind::Pdf),
            CatalogEntry::new("Biology Listening", "https://x.org/3.mp3", ResourceKind::Mp3),
        ];
        let options = CatalogOptions {
            kinds: vec![ResourceKind::Pdf],
            name_filters: vec![" biology ".to_string(), String::new()],
            categories: None,
        };
        let catalog = Catalog::build(entries, &options).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.items()[0].resource().name(), "Biology Unit 1");
    }

    #[test]
    fn empty_result_is_fatal() {
        let err = Catalog::build(Vec::new(), &CatalogOptions::default()).unwrap_err();
        assert_matches!(err, MendError::EmptyCatalog);

        let entries = vec![CatalogEntry::new("a", "https://x.org/a.wav", ResourceKind::Wav)];
        let options = CatalogOptions {
            kinds: vec![ResourceKind::Pdf],
            ..CatalogOptions::default()
        };
        let err = Catalog::build(entries, &options).unwrap_err();
        assert_matches!(err, MendError::EmptyCatalog);
    }
}
