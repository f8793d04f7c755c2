//! Tolerant parser for `svn log --xml --verbose` output

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};
use tracing::{debug, warn};

use crate::domain::{ChangeRecord, PathAction, PathChange, TIMESTAMP_FORMAT};

const DECLARATION_START: &str = "<?xml";
const DECLARATION_END: &str = "?>";
const ENTRY_START: &str = "<logentry";
const ENTRY_END: &str = "</logentry>";

/// Converts raw svn log XML into [`ChangeRecord`]s
///
/// Recovery ladder, first success wins:
/// 1. the text as-is
/// 2. leading garbage and XML declarations removed
/// 3. the result wrapped in a single `<log>` root
/// 4. every `<logentry>` block parsed on its own, broken ones dropped
///
/// If nothing at all can be recovered the result is a single synthetic
/// record with revision 0 describing the failure.
#[derive(Debug, Clone, Default)]
pub struct LogParser {
    fallback_time: Option<DateTime<Utc>>,
}

impl LogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the timestamp used for entries whose date cannot be decoded
    pub fn with_fallback_time(mut self, time: DateTime<Utc>) -> Self {
        self.fallback_time = Some(time);
        self
    }

    /// Parse one logical log stream for `repository`
    pub fn parse(&self, raw: &str, repository: &str) -> Vec<ChangeRecord> {
        debug!(repository, len = raw.len(), "LogParser::parse: called");
        if raw.trim().is_empty() {
            return Vec::new();
        }

        let fallback = self.fallback_time.unwrap_or_else(Utc::now).format(TIMESTAMP_FORMAT).to_string();

        let first_error = match Document::parse(raw) {
            Ok(doc) if is_log_root(&doc) => return collect_entries(&doc, repository, &fallback),
            Ok(_) => "no <log> or <logentry> root element".to_string(),
            Err(e) => e.to_string(),
        };
        debug!(repository, error = %first_error, "Log is not a single document, cleaning");

        let cleaned = clean(raw);
        if let Ok(doc) = Document::parse(&cleaned) {
            if is_log_root(&doc) {
                return collect_entries(&doc, repository, &fallback);
            }
        }

        let wrapped = format!("<log>{}</log>", cleaned);
        if let Ok(doc) = Document::parse(&wrapped) {
            if wraps_log_fragments(&doc) {
                return collect_entries(&doc, repository, &fallback);
            }
        }

        let salvaged = salvage_entries(&cleaned, repository, &fallback);
        if !salvaged.is_empty() {
            warn!(repository, recovered = salvaged.len(), "Recovered log entries individually");
            return salvaged;
        }

        warn!(repository, error = %first_error, "Unable to recover any log entry");
        vec![ChangeRecord::parse_failure(repository, &first_error, fallback)]
    }
}

/// Concatenate paged log outputs into one stream the parser accepts
pub fn join_chunks(chunks: &[String]) -> String {
    chunks
        .iter()
        .map(|chunk| clean(chunk))
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop anything before the first tag and every XML declaration
fn clean(raw: &str) -> String {
    let start = raw.find('<').unwrap_or(raw.len());
    let mut rest = &raw[start..];
    let mut out = String::with_capacity(rest.len());

    while let Some(pos) = rest.find(DECLARATION_START) {
        out.push_str(&rest[..pos]);
        match rest[pos..].find(DECLARATION_END) {
            Some(end) => rest = &rest[pos + end + DECLARATION_END.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// A document parsed as-is counts only if it is a log or a single entry
fn is_log_root(doc: &Document<'_>) -> bool {
    let root = doc.root_element();
    root.has_tag_name("log") || root.has_tag_name("logentry")
}

/// A wrapped document counts only if it wrapped log elements and nothing else
fn wraps_log_fragments(doc: &Document<'_>) -> bool {
    let mut elements = doc.root_element().children().filter(|n| n.is_element()).peekable();
    elements.peek().is_some() && elements.all(|n| n.has_tag_name("log") || n.has_tag_name("logentry"))
}

/// Byte offsets of every `<logentry` open tag
fn entry_starts(text: &str) -> Vec<usize> {
    text.match_indices(ENTRY_START)
        .filter(|(pos, _)| {
            text[pos + ENTRY_START.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
        })
        .map(|(pos, _)| pos)
        .collect()
}

fn collect_entries(doc: &Document<'_>, repository: &str, fallback: &str) -> Vec<ChangeRecord> {
    doc.descendants()
        .filter(|n| n.has_tag_name("logentry"))
        .filter_map(|n| parse_entry(n, repository, fallback))
        .collect()
}

/// Parse each `<logentry>` block on its own
///
/// A block runs from one `<logentry` to the next, trimmed after its last
/// closing tag, so an unterminated entry cannot swallow its neighbour.
fn salvage_entries(text: &str, repository: &str, fallback: &str) -> Vec<ChangeRecord> {
    let starts = entry_starts(text);
    let mut records = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let segment = &text[start..end];
        let Some(close) = segment.rfind(ENTRY_END) else {
            debug!(repository, offset = start, "Unterminated log entry skipped");
            continue;
        };

        match Document::parse(&segment[..close + ENTRY_END.len()]) {
            Ok(doc) => records.extend(collect_entries(&doc, repository, fallback)),
            Err(e) => warn!(repository, offset = start, error = %e, "Malformed log entry skipped"),
        }
    }

    records
}

fn parse_entry(node: Node<'_, '_>, repository: &str, fallback: &str) -> Option<ChangeRecord> {
    let revision = match node.attribute("revision").and_then(|r| r.trim().parse::<u64>().ok()) {
        Some(rev) if rev > 0 => rev,
        _ => {
            warn!(repository, revision = ?node.attribute("revision"), "Log entry without a usable revision skipped");
            return None;
        }
    };

    let author = child_text(node, "author")
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let timestamp = child_text(node, "date")
        .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
        .map(|d| d.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| {
            debug!(repository, revision, "Undecodable commit date, using detection time");
            fallback.to_string()
        });

    let message = child_text(node, "msg").unwrap_or_default();

    let paths = child(node, "paths")
        .map(|paths| {
            paths
                .children()
                .filter(|n| n.has_tag_name("path"))
                .filter_map(|p| {
                    let path = p.text().map(str::trim).unwrap_or_default();
                    if path.is_empty() {
                        return None;
                    }
                    let action = PathAction::from_code(p.attribute("action").unwrap_or("M"));
                    Some(PathChange::new(path, action))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ChangeRecord {
        revision,
        author,
        timestamp,
        message,
        paths,
        repository: repository.to_string(),
    })
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name).map(|n| n.text().unwrap_or_default().trim().to_string())
}
