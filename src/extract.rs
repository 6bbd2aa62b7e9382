//! Flattens a Notion page into a [`CampaignRecord`].
//!
//! Each fallback chain is a small resolver returning the first candidate that
//! is present. Nothing here fails: a property with an unexpected type is
//! treated as absent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::notion::{FileRef, Icon, Page, PropertyValue};

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "svg"];
const VIDEO_EXTS: &[&str] = &["mp4", "webm", "ogg", "mov", "m4v"];

const IMAGE_FIELDS: &[&str] = &["Image", "Thumbnail"];
const PRIMARY_FILE_FIELDS: &[&str] = &["Media", "Files", "Image", "File"];
const VIDEO_FILES_FIELD: &str = "video";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Other,
}

/// One entry of the consolidated files list, as serialized into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub url: String,
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRecord {
    pub slug: String,
    pub destination: String,
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub icon_emoji: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub category: Option<String>,
    pub pinned: bool,
    pub link_tree_enabled: bool,
    pub files: Option<Vec<FileEntry>>,
    pub utm: Utm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingSlug,
    MissingDestination,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingSlug => f.write_str("missing Slug"),
            SkipReason::MissingDestination => f.write_str("missing Destination"),
        }
    }
}

pub fn extract(page: &Page) -> Result<CampaignRecord, SkipReason> {
    let slug = slug(page).ok_or(SkipReason::MissingSlug)?;
    let destination = text_or_url(page, "Destination").ok_or(SkipReason::MissingDestination)?;

    let files = consolidate_files(page);
    let image_url = image_url(page, &files);
    let video_url = video_url(page, &files);
    let title = title(page).unwrap_or_else(|| slug.clone());

    Ok(CampaignRecord {
        title,
        destination,
        description: text_or_url(page, "Description"),
        details: text_or_url(page, "Details"),
        icon_emoji: icon_emoji(page),
        image_url,
        video_url,
        category: category(page),
        pinned: flag(page.property("Pinned"), &["true"]),
        link_tree_enabled: flag(page.property("Link Tree Enabled"), &["true", "yes", "enabled"]),
        files: (!files.is_empty()).then_some(files),
        utm: Utm {
            utm_source: text_or_url(page, "UTM Source"),
            utm_campaign: text_or_url(page, "UTM Campaign"),
            utm_medium: text_or_url(page, "UTM Medium"),
        },
        slug,
    })
}

// --- property primitives ---

fn first_run(runs: &[crate::notion::TextRun]) -> Option<String> {
    runs.first().map(|r| r.plain_text.clone()).filter(|s| !s.is_empty())
}

fn rich_text(page: &Page, name: &str) -> Option<String> {
    match page.property(name)? {
        PropertyValue::RichText { rich_text } => first_run(rich_text),
        _ => None,
    }
}

fn url_prop(page: &Page, name: &str) -> Option<String> {
    match page.property(name)? {
        PropertyValue::Url { url } => url.clone().filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn text_or_url(page: &Page, name: &str) -> Option<String> {
    match page.property(name)? {
        PropertyValue::RichText { rich_text } => first_run(rich_text),
        PropertyValue::Url { url } => url.clone().filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn first_file_url(files: &[FileRef]) -> Option<String> {
    files.iter().map(FileRef::url).find(|u| !u.is_empty()).map(str::to_string)
}

// --- resolvers ---

pub fn slug(page: &Page) -> Option<String> {
    let raw = rich_text(page, "Slug")?;
    let s = raw.strip_prefix('/').unwrap_or(&raw).to_string();
    (!s.is_empty()).then_some(s)
}

pub fn title(page: &Page) -> Option<String> {
    match page.property("Title")? {
        PropertyValue::RichText { rich_text } => first_run(rich_text),
        PropertyValue::Title { title } => first_run(title),
        _ => None,
    }
}

pub fn icon_emoji(page: &Page) -> Option<String> {
    match page.icon.as_ref()? {
        Icon::Emoji { emoji } if !emoji.is_empty() => Some(emoji.clone()),
        _ => None,
    }
}

pub fn category(page: &Page) -> Option<String> {
    match page.property("Category")? {
        PropertyValue::Select { select } => {
            select.as_ref().map(|s| s.name.clone()).filter(|s| !s.is_empty())
        }
        PropertyValue::RichText { rich_text } => first_run(rich_text),
        _ => None,
    }
}

/// Checkbox wins outright; a select counts as true when its lower-cased name is in `truthy`.
pub fn flag(prop: Option<&PropertyValue>, truthy: &[&str]) -> bool {
    match prop {
        Some(PropertyValue::Checkbox { checkbox }) => *checkbox,
        Some(PropertyValue::Select { select: Some(opt) }) => {
            let name = opt.name.to_lowercase();
            truthy.iter().any(|t| *t == name)
        }
        _ => false,
    }
}

pub fn image_url(page: &Page, files: &[FileEntry]) -> Option<String> {
    IMAGE_FIELDS
        .iter()
        .find_map(|f| url_prop(page, f))
        .or_else(|| IMAGE_FIELDS.iter().find_map(|f| rich_text(page, f)))
        .or_else(|| {
            IMAGE_FIELDS.iter().find_map(|f| match page.property(f)? {
                PropertyValue::Files { files } => first_file_url(files),
                _ => None,
            })
        })
        .or_else(|| match page.cover.as_ref()? {
            FileRef::External { external, .. } if !external.url.is_empty() => {
                Some(external.url.clone())
            }
            _ => None,
        })
        .or_else(|| {
            files
                .iter()
                .find(|e| e.kind == FileKind::Image || matches_exts(&e.url, IMAGE_EXTS).is_some())
                .map(|e| e.url.clone())
        })
}

pub fn video_url(page: &Page, files: &[FileEntry]) -> Option<String> {
    url_prop(page, "Video").or_else(|| {
        files
            .iter()
            .find(|e| e.kind == FileKind::Video || matches_exts(&e.url, VIDEO_EXTS).is_some())
            .map(|e| e.url.clone())
    })
}

/// Primary list from the first present files-typed field, then the `video` extras.
pub fn consolidate_files(page: &Page) -> Vec<FileEntry> {
    let primary = PRIMARY_FILE_FIELDS.iter().find_map(|f| match page.property(f)? {
        PropertyValue::Files { files } => Some(files),
        _ => None,
    });

    let mut out: Vec<FileEntry> = primary
        .into_iter()
        .flatten()
        .filter_map(|f| file_entry(f, None))
        .collect();

    if let Some(PropertyValue::Files { files }) = page.property(VIDEO_FILES_FIELD) {
        out.extend(files.iter().filter_map(|f| file_entry(f, Some(FileKind::Video))));
    }
    out
}

fn file_entry(f: &FileRef, forced: Option<FileKind>) -> Option<FileEntry> {
    let url = f.url();
    if url.is_empty() {
        return None;
    }
    let name = f.name().filter(|n| !n.is_empty()).unwrap_or(url).to_string();
    let (inferred, ext) = infer_kind(&name, url);
    Some(FileEntry {
        name,
        url: url.to_string(),
        kind: forced.unwrap_or(inferred),
        ext,
        expiry: f.expiry().map(str::to_string),
    })
}

/// Classify by the filename first, then by the URL.
pub fn infer_kind(name: &str, url: &str) -> (FileKind, Option<String>) {
    for candidate in [name, url] {
        if let Some(ext) = matches_exts(candidate, IMAGE_EXTS) {
            return (FileKind::Image, Some(ext));
        }
        if let Some(ext) = matches_exts(candidate, VIDEO_EXTS) {
            return (FileKind::Video, Some(ext));
        }
    }
    (FileKind::Other, extension(name).or_else(|| extension(url)))
}

fn matches_exts(s: &str, exts: &[&str]) -> Option<String> {
    extension(s).filter(|e| exts.contains(&e.as_str()))
}

fn extension(s: &str) -> Option<String> {
    let path = s.split(['?', '#']).next().unwrap_or(s);
    let last = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = last.rsplit_once('.')?;
    let plain = !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric());
    plain.then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn page(props: Value) -> Page {
        serde_json::from_value(json!({ "id": "p", "properties": props })).unwrap()
    }

    fn rt(s: &str) -> Value {
        json!({ "type": "rich_text", "rich_text": [{ "plain_text": s }] })
    }

    fn external(name: &str, url: &str) -> Value {
        json!({ "name": name, "type": "external", "external": { "url": url } })
    }

    fn files(entries: Vec<Value>) -> Value {
        json!({ "type": "files", "files": entries })
    }

    fn base() -> serde_json::Map<String, Value> {
        let mut m = serde_json::Map::new();
        m.insert("Slug".into(), rt("/promo-2024"));
        m.insert("Destination".into(), json!({ "type": "url", "url": "https://shop.example.com" }));
        m
    }

    #[test]
    fn slug_strips_one_leading_slash() {
        let rec = extract(&page(Value::Object(base()))).unwrap();
        assert_eq!(rec.slug, "promo-2024");
        let p = page(json!({ "Slug": rt("//double") }));
        assert_eq!(slug(&p).as_deref(), Some("/double"));
    }

    #[test]
    fn missing_slug_or_destination_skips() {
        let mut m = base();
        m.remove("Slug");
        assert_eq!(extract(&page(Value::Object(m))), Err(SkipReason::MissingSlug));
        let mut m = base();
        m.remove("Destination");
        assert_eq!(extract(&page(Value::Object(m))), Err(SkipReason::MissingDestination));
    }

    #[test]
    fn title_prefers_rich_text_then_title_then_slug() {
        let mut m = base();
        m.insert(
            "Title".into(),
            json!({ "type": "title", "title": [{ "plain_text": "Big Sale" }] }),
        );
        assert_eq!(extract(&page(Value::Object(m))).unwrap().title, "Big Sale");

        let mut m = base();
        m.insert("Title".into(), rt("Rich"));
        assert_eq!(extract(&page(Value::Object(m))).unwrap().title, "Rich");

        assert_eq!(extract(&page(Value::Object(base()))).unwrap().title, "promo-2024");
    }

    #[test]
    fn checkbox_pinned_ignores_select_elsewhere() {
        let mut m = base();
        m.insert("Pinned".into(), json!({ "type": "checkbox", "checkbox": true }));
        assert!(extract(&page(Value::Object(m))).unwrap().pinned);
    }

    #[test]
    fn flag_select_values() {
        let sel = |n: &str| -> PropertyValue {
            serde_json::from_value(json!({ "type": "select", "select": { "name": n } })).unwrap()
        };
        assert!(flag(Some(&sel("TRUE")), &["true"]));
        assert!(!flag(Some(&sel("yes")), &["true"]));
        assert!(flag(Some(&sel("Enabled")), &["true", "yes", "enabled"]));
        assert!(!flag(Some(&sel("no")), &["true", "yes", "enabled"]));
        assert!(!flag(None, &["true"]));
        let empty: PropertyValue =
            serde_json::from_value(json!({ "type": "select", "select": null })).unwrap();
        assert!(!flag(Some(&empty), &["true"]));
    }

    #[test]
    fn image_from_media_file_when_nothing_explicit() {
        let mut m = base();
        let hosted = json!({
            "name": "banner.png",
            "type": "file",
            "file": { "url": "https://s3/abc?sig=1", "expiry_time": "2024-05-01T00:00:00Z" }
        });
        m.insert("Media".into(), files(vec![hosted]));
        let rec = extract(&page(Value::Object(m))).unwrap();
        assert_eq!(rec.image_url.as_deref(), Some("https://s3/abc?sig=1"));
        let files = rec.files.unwrap();
        assert_eq!(files[0].kind, FileKind::Image);
        assert_eq!(files[0].ext.as_deref(), Some("png"));
        assert_eq!(files[0].expiry.as_deref(), Some("2024-05-01T00:00:00Z"));
        assert_eq!(rec.video_url, None);
    }

    #[test]
    fn image_priority_chain() {
        let image_of = |p: &Page| extract(p).unwrap().image_url;

        let mut m = base();
        m.insert("Thumbnail".into(), rt("https://rt/thumb.jpg"));
        m.insert("Image".into(), json!({ "type": "url", "url": "https://explicit/img.jpg" }));
        assert_eq!(
            image_of(&page(Value::Object(m))).as_deref(),
            Some("https://explicit/img.jpg")
        );

        let mut m = base();
        m.insert("Thumbnail".into(), rt("https://rt/thumb.jpg"));
        assert_eq!(image_of(&page(Value::Object(m))).as_deref(), Some("https://rt/thumb.jpg"));

        let mut m = base();
        m.insert(
            "Thumbnail".into(),
            files(vec![external("empty", ""), external("t", "https://ext/t")]),
        );
        assert_eq!(image_of(&page(Value::Object(m))).as_deref(), Some("https://ext/t"));

        let mut p = page(Value::Object(base()));
        p.cover = serde_json::from_value(
            json!({ "type": "external", "external": { "url": "https://cover/c.jpg" } }),
        )
        .unwrap();
        assert_eq!(image_of(&p).as_deref(), Some("https://cover/c.jpg"));
    }

    #[test]
    fn hosted_cover_is_not_used() {
        let mut p = page(Value::Object(base()));
        p.cover =
            serde_json::from_value(json!({ "type": "file", "file": { "url": "https://s3/c.jpg" } }))
                .unwrap();
        assert_eq!(extract(&p).unwrap().image_url, None);
    }

    #[test]
    fn unknown_file_types_are_ignored() {
        let mut m = base();
        m.insert(
            "Media".into(),
            files(vec![
                json!({ "type": "file_upload", "file_upload": { "id": "upl_1" } }),
                external("a.mp4", "https://cdn/a.mp4"),
            ]),
        );
        let p: Page = serde_json::from_value(json!({
            "id": "p",
            "cover": { "type": "file_upload", "file_upload": { "id": "upl_2" } },
            "properties": Value::Object(m),
        }))
        .unwrap();
        assert!(matches!(p.cover, Some(FileRef::Unsupported)));

        let rec = extract(&p).unwrap();
        assert_eq!(rec.slug, "promo-2024");
        assert_eq!(rec.image_url, None);
        assert_eq!(rec.video_url.as_deref(), Some("https://cdn/a.mp4"));
        let files = rec.files.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.mp4");
    }

    #[test]
    fn files_first_field_wins_and_video_extras_append() {
        let mut m = base();
        m.insert("Files".into(), files(vec![external("doc.pdf", "https://cdn/doc.pdf")]));
        m.insert("File".into(), files(vec![external("ignored.png", "https://cdn/ignored.png")]));
        m.insert("video".into(), files(vec![external("clip.bin", "https://cdn/clip.bin")]));
        let rec = extract(&page(Value::Object(m))).unwrap();
        let files = rec.files.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "doc.pdf");
        assert_eq!(files[0].kind, FileKind::Other);
        assert_eq!(files[0].ext.as_deref(), Some("pdf"));
        assert_eq!(files[1].kind, FileKind::Video);
        assert_eq!(rec.video_url.as_deref(), Some("https://cdn/clip.bin"));
        assert_eq!(rec.image_url, None);
    }

    #[test]
    fn explicit_video_url_wins() {
        let mut m = base();
        m.insert("Video".into(), json!({ "type": "url", "url": "https://yt/v" }));
        m.insert("Media".into(), files(vec![external("a.mp4", "https://cdn/a.mp4")]));
        let rec = extract(&page(Value::Object(m))).unwrap();
        assert_eq!(rec.video_url.as_deref(), Some("https://yt/v"));
    }

    #[test]
    fn kind_inferred_from_url_when_name_is_opaque() {
        assert_eq!(
            infer_kind("upload", "https://cdn/x/movie.MOV?t=1"),
            (FileKind::Video, Some("mov".into()))
        );
        assert_eq!(infer_kind("readme", "https://cdn/readme"), (FileKind::Other, None));
    }

    #[test]
    fn optional_fields_and_utm() {
        let mut m = base();
        m.insert("Description".into(), rt("desc"));
        m.insert("Category".into(), json!({ "type": "select", "select": { "name": "Merch" } }));
        m.insert("UTM Source".into(), rt("newsletter"));
        m.insert(
            "Link Tree Enabled".into(),
            json!({ "type": "select", "select": { "name": "Yes" } }),
        );
        let mut p = page(Value::Object(m));
        p.icon = serde_json::from_value(json!({ "type": "emoji", "emoji": "🔥" })).unwrap();
        let rec = extract(&p).unwrap();
        assert_eq!(rec.description.as_deref(), Some("desc"));
        assert_eq!(rec.details, None);
        assert_eq!(rec.category.as_deref(), Some("Merch"));
        assert_eq!(rec.icon_emoji.as_deref(), Some("🔥"));
        assert!(rec.link_tree_enabled);
        assert!(!rec.pinned);
        assert_eq!(rec.utm.utm_source.as_deref(), Some("newsletter"));
        assert_eq!(rec.utm.utm_medium, None);
        assert_eq!(rec.files, None);
    }

    #[test]
    fn files_json_round_trip_keeps_order() {
        let files = vec![
            FileEntry {
                name: "a.png".into(),
                url: "https://s3/a.png".into(),
                kind: FileKind::Image,
                ext: Some("png".into()),
                expiry: Some("2024-01-01T00:00:00Z".into()),
            },
            FileEntry {
                name: "b".into(),
                url: "https://cdn/b".into(),
                kind: FileKind::Video,
                ext: None,
                expiry: None,
            },
        ];
        let s = serde_json::to_string(&files).unwrap();
        assert!(!s.contains("null"));
        let back: Vec<FileEntry> = serde_json::from_str(&s).unwrap();
        assert_eq!(back, files);
    }
}
