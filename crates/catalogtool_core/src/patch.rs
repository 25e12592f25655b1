use std::fmt;
use std::ops::Range;

use log::debug;
use regex::Regex;

use crate::registry::{PackageRecord, RepositoryRecord};

/// Bytes searched after a connector's name token for one of its fields.
/// Entries closer together than this can shadow each other's missing fields.
pub const FIELD_WINDOW: usize = 600;

pub const DATE_STAMP_SUBJECT: &str = "Directory";
const DATE_STAMP_FIELD: &str = "current as of";
const DATE_STAMP_PATTERN: &str = r"Current as of ([A-Z][a-z]+ \d{1,2}, \d{4})";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Version,
    Updated,
    Stars,
    Downloads,
}

impl Field {
    pub fn key(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Updated => "updated",
            Self::Stars => "stars",
            Self::Downloads => "downloads",
        }
    }

    fn pattern(self) -> Option<Regex> {
        Regex::new(&format!(
            r#"["']?\b{}\b["']?\s*:\s*(?:"([^"\n]*)"|'([^'\n]*)')"#,
            self.key()
        ))
        .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub subject: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} → {}",
            self.subject, self.field, self.old_value, self.new_value
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub document: String,
    pub changes: Vec<Change>,
}

/// Apply fetched metadata to the document text, in catalog order. Fields are
/// located afresh for every update, so earlier rewrites never invalidate later
/// searches.
pub fn patch_document(
    document: &str,
    packages: &[(String, PackageRecord)],
    repositories: &[(String, RepositoryRecord)],
    today: &str,
) -> PatchOutcome {
    let mut text = document.to_string();
    let mut changes = Vec::new();

    for (name, record) in packages {
        changes.extend(patch_field(&mut text, name, Field::Version, &record.version));
        if let Some(published) = &record.publish_date {
            changes.extend(patch_field(&mut text, name, Field::Updated, published));
        }
        if let Some(tier) = record.download_tier {
            changes.extend(patch_field(&mut text, name, Field::Downloads, tier.as_str()));
        }
    }

    for (name, record) in repositories {
        changes.extend(patch_field(
            &mut text,
            name,
            Field::Stars,
            &record.stars_formatted,
        ));
        // A package publish date, when known, outranks the last push.
        let package_dated = packages
            .iter()
            .any(|(package_name, package)| package_name == name && package.publish_date.is_some());
        if !package_dated && let Some(pushed) = &record.last_pushed {
            changes.extend(patch_field(&mut text, name, Field::Updated, pushed));
        }
    }

    changes.extend(patch_date_stamp(&mut text, today));

    PatchOutcome {
        document: text,
        changes,
    }
}

/// Rewrite one `(name, field)` slot in place. Returns `None` when the slot is
/// missing, ambiguous, or already holds `new_value`.
pub fn patch_field(
    document: &mut String,
    name: &str,
    field: Field,
    new_value: &str,
) -> Option<Change> {
    let range = locate_field(document, name, field)?;
    let old_value = &document[range.clone()];
    if old_value == new_value {
        return None;
    }
    let change = Change {
        subject: name.to_string(),
        field: field.key().to_string(),
        old_value: old_value.to_string(),
        new_value: new_value.to_string(),
    };
    document.replace_range(range, new_value);
    Some(change)
}

pub fn patch_date_stamp(document: &mut String, today: &str) -> Option<Change> {
    let pattern = Regex::new(DATE_STAMP_PATTERN).ok()?;
    let current = pattern.captures(document)?.get(1)?;
    let range = current.range();
    let old_value = current.as_str().to_string();
    if old_value == today {
        return None;
    }
    document.replace_range(range, today);
    Some(Change {
        subject: DATE_STAMP_SUBJECT.to_string(),
        field: DATE_STAMP_FIELD.to_string(),
        old_value,
        new_value: today.to_string(),
    })
}

/// Byte range of the quoted value of `field` in the entry named `name`.
pub fn locate_field(document: &str, name: &str, field: Field) -> Option<Range<usize>> {
    let escaped = regex::escape(name);
    let name_pattern = Regex::new(&format!(
        r#"\bname["']?\s*:\s*(?:"{escaped}"|'{escaped}')"#
    ))
    .ok()?;
    let field_pattern = field.pattern()?;

    let mut slots = Vec::new();
    for name_match in name_pattern.find_iter(document) {
        let start = name_match.end();
        let end = window_end(document, start);
        let Some(captures) = field_pattern.captures(&document[start..end]) else {
            continue;
        };
        if let Some(value) = captures.get(1).or_else(|| captures.get(2)) {
            slots.push(start + value.start()..start + value.end());
        }
    }

    // Nested name tokens can reach the same value; that is still one slot.
    slots.sort_by_key(|slot| slot.start);
    slots.dedup();

    match slots.len() {
        0 => None,
        1 => slots.pop(),
        count => {
            debug!("{name}: {} matched {count} slots, leaving untouched", field.key());
            None
        }
    }
}

fn window_end(document: &str, start: usize) -> usize {
    let mut end = start.saturating_add(FIELD_WINDOW).min(document.len());
    while !document.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DownloadTier;

    const DOCUMENT: &str = r#"<!doctype html>
<html>
<body>
  <p class="stamp">Current as of October 1, 2026</p>
  <script>
    const connectors = [
      { name: "Redis", version: "1.0.0", updated: "2025-01", stars: "300+", downloads: "Low" },
      { name: "Jira & Confluence", version: "0.9.0", updated: "2025-02", stars: "2.1k", downloads: "Moderate" },
      { name: "Docker", version: "0.1.0", updated: "2025-03", stars: "1k", downloads: "Low" },
    ];
  </script>
</body>
</html>
"#;

    fn package(version: &str, publish_date: Option<&str>, tier: Option<DownloadTier>) -> PackageRecord {
        PackageRecord {
            version: version.to_string(),
            publish_date: publish_date.map(ToString::to_string),
            weekly_downloads: None,
            download_tier: tier,
        }
    }

    fn repository(stars: &str, pushed: Option<&str>) -> RepositoryRecord {
        RepositoryRecord {
            star_count: 0,
            stars_formatted: stars.to_string(),
            last_pushed: pushed.map(ToString::to_string),
        }
    }

    #[test]
    fn version_update_is_logged_and_applied() {
        let packages = vec![("Redis".to_string(), package("1.2.0", None, None))];

        let outcome = patch_document(DOCUMENT, &packages, &[], "October 1, 2026");

        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].to_string(), "Redis: version 1.0.0 → 1.2.0");
        assert!(outcome.document.contains(r#"{ name: "Redis", version: "1.2.0", updated: "2025-01""#));
        assert_eq!(
            outcome.document.replace(r#"version: "1.2.0""#, r#"version: "1.0.0""#),
            DOCUMENT
        );
    }

    #[test]
    fn second_pass_with_same_data_reports_nothing() {
        let packages = vec![(
            "Redis".to_string(),
            package("1.2.0", Some("2026-09"), Some(DownloadTier::Moderate)),
        )];
        let repositories = vec![("Docker".to_string(), repository("1.4k", Some("2026-10")))];

        let first = patch_document(DOCUMENT, &packages, &repositories, "October 18, 2026");
        assert_eq!(first.changes.len(), 6);

        let second = patch_document(&first.document, &packages, &repositories, "October 18, 2026");
        assert!(second.changes.is_empty());
        assert_eq!(second.document, first.document);
    }

    #[test]
    fn names_with_pattern_characters_are_matched_literally() {
        let repositories = vec![
            ("Jira & Confluence".to_string(), repository("4.6k", None)),
            ("Jira.*".to_string(), repository("999k", None)),
        ];

        let outcome = patch_document(DOCUMENT, &[], &repositories, "October 1, 2026");

        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(
            outcome.changes[0].to_string(),
            "Jira & Confluence: stars 2.1k → 4.6k"
        );
        assert!(outcome.document.contains(r#"stars: "300+""#));
        assert!(outcome.document.contains(r#"stars: "1k""#));
    }

    #[test]
    fn missing_entry_or_field_is_skipped() {
        let mut document = DOCUMENT.to_string();
        assert!(patch_field(&mut document, "Postgres", Field::Version, "2.0.0").is_none());

        let mut sparse = r#"{ name: "Slack", version: "1.0.0" }"#.to_string();
        assert!(patch_field(&mut sparse, "Slack", Field::Stars, "5k").is_none());
        assert_eq!(sparse, r#"{ name: "Slack", version: "1.0.0" }"#);
    }

    #[test]
    fn ambiguous_slots_are_left_untouched() {
        let mut document = r#"
            { name: "Redis", version: "1.0.0" },
            { name: "Redis", version: "0.8.0" },
        "#
        .to_string();
        let before = document.clone();
        assert!(patch_field(&mut document, "Redis", Field::Version, "1.2.0").is_none());
        assert_eq!(document, before);
    }

    #[test]
    fn nested_name_reaching_the_same_value_is_one_slot() {
        let mut document =
            r#"{ name: "Redis", aliases: [{ name: "Redis" }], version: "1.0.0" }"#.to_string();
        let range = locate_field(&document, "Redis", Field::Version).expect("single slot");
        assert_eq!(&document[range], "1.0.0");

        let change = patch_field(&mut document, "Redis", Field::Version, "1.2.0").expect("change");
        assert_eq!(change.to_string(), "Redis: version 1.0.0 → 1.2.0");
        assert_eq!(
            document,
            r#"{ name: "Redis", aliases: [{ name: "Redis" }], version: "1.2.0" }"#
        );
    }

    #[test]
    fn changes_follow_catalog_order_not_alphabetical() {
        let repositories = vec![
            ("Redis".to_string(), repository("400+", None)),
            ("Docker".to_string(), repository("2k", None)),
            ("Jira & Confluence".to_string(), repository("3k", None)),
        ];

        let outcome = patch_document(DOCUMENT, &[], &repositories, "October 1, 2026");
        let subjects = outcome
            .changes
            .iter()
            .map(|change| change.subject.as_str())
            .collect::<Vec<_>>();
        assert_eq!(subjects, vec!["Redis", "Docker", "Jira & Confluence"]);
    }

    #[test]
    fn quoted_keys_and_single_quotes_are_supported() {
        let mut document = r#"{"name": "Stripe", "version": "0.2.0"} { name: 'Sentry', version: '1.0.0' }"#
            .to_string();
        let change = patch_field(&mut document, "Stripe", Field::Version, "0.3.1").expect("change");
        assert_eq!(change.old_value, "0.2.0");
        let change = patch_field(&mut document, "Sentry", Field::Version, "1.1.0").expect("change");
        assert_eq!(change.old_value, "1.0.0");
        assert_eq!(
            document,
            r#"{"name": "Stripe", "version": "0.3.1"} { name: 'Sentry', version: '1.1.0' }"#
        );
    }

    #[test]
    fn field_outside_window_is_not_found() {
        let padding = " ".repeat(FIELD_WINDOW);
        let document = format!(r#"{{ name: "Redis",{padding}version: "1.0.0" }}"#);
        assert!(locate_field(&document, "Redis", Field::Version).is_none());
    }

    #[test]
    fn window_respects_multibyte_boundaries() {
        let filler = "é".repeat(FIELD_WINDOW);
        let document = format!(r#"{{ name: "Redis", description: "{filler}", version: "1.0.0" }}"#);
        assert!(locate_field(&document, "Redis", Field::Version).is_none());
    }

    #[test]
    fn package_publish_date_outranks_repository_push() {
        let packages = vec![("Redis".to_string(), package("1.0.0", Some("2026-08"), None))];
        let repositories = vec![("Redis".to_string(), repository("300+", Some("2026-10")))];

        let outcome = patch_document(DOCUMENT, &packages, &repositories, "October 1, 2026");
        let rendered = outcome
            .changes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(rendered, vec!["Redis: updated 2025-01 → 2026-08"]);
    }

    #[test]
    fn repository_push_fills_date_without_package() {
        let repositories = vec![("Docker".to_string(), repository("1k", Some("2026-10")))];

        let outcome = patch_document(DOCUMENT, &[], &repositories, "October 1, 2026");
        let rendered = outcome
            .changes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(rendered, vec!["Docker: updated 2025-03 → 2026-10"]);
    }

    #[test]
    fn date_stamp_is_replaced_once() {
        let mut document =
            "Current as of October 1, 2026 ... Current as of October 1, 2026".to_string();
        let change = patch_date_stamp(&mut document, "October 18, 2026").expect("change");
        assert_eq!(
            change.to_string(),
            "Directory: current as of October 1, 2026 → October 18, 2026"
        );
        assert_eq!(
            document,
            "Current as of October 18, 2026 ... Current as of October 1, 2026"
        );
        assert!(patch_date_stamp(&mut document, "October 18, 2026").is_none());
    }

    #[test]
    fn missing_date_stamp_is_skipped() {
        let mut document = "<p>No stamp here</p>".to_string();
        assert!(patch_date_stamp(&mut document, "October 18, 2026").is_none());
    }
}
