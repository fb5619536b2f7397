//! Terminal-safe text and markdown.
//!
//! Everything that reaches the terminal goes through [`sanitize_plain_text`] or
//! [`sanitize_markdown`]. No raw control character survives either function, and a
//! markdown link only stays clickable when the [`SanitizePolicy`] allows its scheme.
//! Link syntax is found with `pulldown-cmark`, so every form a CommonMark renderer
//! would activate is covered, including reference links.

use crate::message::ContentBlock;
use pulldown_cmark::{Event, LinkType, Options, Parser, Tag, TagEnd};
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;
use url::Url;

/// Replacement for the `:` that follows a URL scheme in defanged output.
pub const DEFANGED_COLON: &str = "&#58;";

/// Options for [`sanitize_plain_text`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainTextOptions {
    /// Keep `\n` as-is instead of showing its control picture
    pub preserve_newlines: bool,
    /// Keep `\t` as-is instead of showing its control picture
    pub preserve_tabs: bool,
}

impl Default for PlainTextOptions {
    fn default() -> Self {
        Self {
            preserve_newlines: true,
            preserve_tabs: true,
        }
    }
}

/// Which URLs may be emitted as real, clickable links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizePolicy {
    pub hyperlinks_enabled: bool,
    /// Lowercase scheme names, without the trailing `:`
    pub allowed_schemes: BTreeSet<String>,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            hyperlinks_enabled: false,
            allowed_schemes: default_allowed_schemes(),
        }
    }
}

impl SanitizePolicy {
    /// Hyperlinks enabled for exactly `schemes`.
    pub fn with_hyperlinks<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hyperlinks_enabled: true,
            allowed_schemes: schemes
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether a URL with `scheme` may be emitted as a clickable link.
    pub fn allows(&self, scheme: &str) -> bool {
        self.hyperlinks_enabled
            && self
                .allowed_schemes
                .contains(scheme.to_ascii_lowercase().as_str())
    }
}

pub fn default_allowed_schemes() -> BTreeSet<String> {
    ["https", "http", "mailto"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Explicit directional formatting characters (LRE..RLO, LRI..PDI).
fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}

/// Replace every control character with a visible stand-in and drop bidi overrides.
///
/// C0 controls and DEL become their Unicode control pictures (`\x1b` → `␛`), C1
/// controls become a bracketed hex token (`\u{9b}` → `<0x9B>`).
pub fn sanitize_plain_text(input: &str, options: PlainTextOptions) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars().filter(|c| !is_bidi_control(*c)) {
        match c {
            '\n' if options.preserve_newlines => out.push(c),
            '\t' if options.preserve_tabs => out.push(c),
            '\u{0}'..='\u{1F}' => out.push(control_picture(c)),
            '\u{7F}' => out.push('\u{2421}'),
            '\u{80}'..='\u{9F}' => out.push_str(&format!("<0x{:02X}>", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

fn control_picture(c: char) -> char {
    char::from_u32(0x2400 + c as u32).unwrap_or('\u{FFFD}')
}

/// Sanitize a markdown string for display.
///
/// The whole input is first passed through [`sanitize_plain_text`]. The result is
/// parsed as CommonMark; every link, image, autolink and reference definition is
/// resolved against `policy`, and anything not allowed is rewritten into inert text
/// such as `docs (https&#58;//example.com/)`. Bare URLs in the remaining text are
/// resolved the same way.
pub fn sanitize_markdown(markdown: &str, policy: &SanitizePolicy) -> String {
    let mut text = sanitize_plain_text(markdown, PlainTextOptions::default());
    for _ in 0..MAX_REWRITE_PASSES {
        text = rewrite_links(&text, policy);
        if !has_blocked_link(&text, policy) {
            return text;
        }
    }
    tracing::warn!("blocked link survived rewriting; escaping all link syntax");
    escape_link_syntax(&text)
}

/// Outcome of resolving a URL against a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUrl {
    /// Canonical URL that may be emitted as a real link
    Link(String),
    /// Display text that cannot be activated
    Inert(String),
}

impl ResolvedUrl {
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link(_))
    }
}

/// Parse, canonicalize and check a candidate URL.
///
/// The returned URL is the `url` crate serialization, not the input: scheme and host
/// are lowercased and a host-only URL gains a trailing `/` (`https://example.com`
/// becomes `https://example.com/`).
///
/// Unparseable input fails closed: it comes back as inert text with any scheme
/// colon defanged.
pub fn resolve_url(candidate: &str, policy: &SanitizePolicy) -> ResolvedUrl {
    let cleaned: String = candidate
        .chars()
        .filter(|c| !is_bidi_control(*c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();

    match Url::parse(cleaned) {
        Ok(url) => {
            let canonical = url.as_str();
            if policy.allows(url.scheme()) {
                ResolvedUrl::Link(canonical.to_string())
            } else {
                ResolvedUrl::Inert(defang_first_colon(canonical))
            }
        }
        Err(err) => {
            tracing::debug!(%err, "treating unparseable URL as text");
            ResolvedUrl::Inert(defang_inert_text(cleaned))
        }
    }
}

/// Defang every bare `http(s)://` / `mailto:` URL in `text` that `policy` would not
/// emit as a link.
pub fn defang_bare_urls(text: &str, policy: &SanitizePolicy) -> String {
    BARE_URL_RE
        .replace_all(text, |caps: &Captures<'_>| render_bare(&caps[0], policy))
        .into_owned()
}

/// Copy of `block` with every display string sanitized.
pub fn sanitize_content_block(block: &ContentBlock, options: PlainTextOptions) -> ContentBlock {
    match block {
        ContentBlock::Text { text } => ContentBlock::Text {
            text: sanitize_plain_text(text, options),
        },
        ContentBlock::ToolUse { id, name, input } => ContentBlock::ToolUse {
            id: sanitize_plain_text(id, options),
            name: sanitize_plain_text(name, options),
            input: sanitize_json_strings(input, options),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentBlock::ToolResult {
            tool_use_id: sanitize_plain_text(tool_use_id, options),
            content: sanitize_plain_text(content, options),
            is_error: *is_error,
        },
        ContentBlock::Thinking {
            text,
            budget_tokens,
        } => ContentBlock::Thinking {
            text: sanitize_plain_text(text, options),
            budget_tokens: *budget_tokens,
        },
    }
}

fn sanitize_json_strings(value: &Value, options: PlainTextOptions) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_plain_text(s, options)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_json_strings(item, options))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    (
                        sanitize_plain_text(k, options),
                        sanitize_json_strings(v, options),
                    )
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

// ── Patterns ────────────────────────────────────────────────────────────────

const BARE_URL_PATTERN: &str = r"(?i:https?://|mailto:)[^\s<>()\[\]]+";

static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(BARE_URL_PATTERN).unwrap());

static LEADING_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").unwrap());

// ── Markdown links ──────────────────────────────────────────────────────────

/// Rewrite passes before falling back to escaping every link opener.
const MAX_REWRITE_PASSES: usize = 3;

/// A link or image being collected from the event stream.
struct PendingLink {
    range: Range<usize>,
    image: bool,
    autolink: bool,
    dest: String,
    title: String,
    label: String,
}

/// A source range and the text that replaces it.
struct Edit {
    range: Range<usize>,
    replacement: String,
}

fn rewrite_links(text: &str, policy: &SanitizePolicy) -> String {
    let parser = Parser::new_ext(text, Options::empty());
    let mut edits: Vec<Edit> = parser
        .reference_definitions()
        .iter()
        .filter(|(_, def)| !resolve_url(&def.dest, policy).is_link())
        .filter_map(|(_, def)| {
            let source = text.get(def.span.clone())?;
            Some(Edit {
                range: def.span.clone(),
                replacement: neutralize_definition(source),
            })
        })
        .collect();

    let mut pending: Option<PendingLink> = None;
    let mut depth = 0usize;
    for (event, range) in parser.into_offset_iter() {
        let opened = match &event {
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            }) => Some((false, *link_type, dest_url, title)),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                ..
            }) => Some((true, *link_type, dest_url, title)),
            _ => None,
        };
        if let Some((image, link_type, dest_url, title)) = opened {
            depth += 1;
            // Images nested in a link label fold into that label.
            if depth == 1 {
                pending = Some(PendingLink {
                    range,
                    image,
                    autolink: matches!(link_type, LinkType::Autolink | LinkType::Email),
                    dest: link_destination(link_type, dest_url),
                    title: title.to_string(),
                    label: String::new(),
                });
            }
            continue;
        }

        match event {
            Event::End(TagEnd::Link | TagEnd::Image) => {
                depth = depth.saturating_sub(1);
                if depth == 0
                    && let Some(link) = pending.take()
                {
                    edits.push(Edit {
                        replacement: render_link(&link, policy),
                        range: link.range,
                    });
                }
            }
            Event::Text(part) | Event::Code(part) if depth > 0 => {
                if let Some(link) = pending.as_mut() {
                    link.label.push_str(&part);
                }
            }
            Event::SoftBreak | Event::HardBreak if depth > 0 => {
                if let Some(link) = pending.as_mut() {
                    link.label.push(' ');
                }
            }
            _ => {}
        }
    }

    edits.sort_by_key(|edit| edit.range.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor {
            continue;
        }
        let Some(gap) = text.get(cursor..edit.range.start) else {
            continue;
        };
        out.push_str(&defang_bare_urls(gap, policy));
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&defang_bare_urls(
        text.get(cursor..).unwrap_or_default(),
        policy,
    ));
    out
}

/// Whether `text` still parses to a link or definition `policy` does not allow.
fn has_blocked_link(text: &str, policy: &SanitizePolicy) -> bool {
    let mut parser = Parser::new_ext(text, Options::empty());
    if parser
        .reference_definitions()
        .iter()
        .any(|(_, def)| !resolve_url(&def.dest, policy).is_link())
    {
        return true;
    }
    parser.any(|event| match event {
        Event::Start(
            Tag::Link {
                link_type,
                dest_url,
                ..
            }
            | Tag::Image {
                link_type,
                dest_url,
                ..
            },
        ) => !resolve_url(&link_destination(link_type, &dest_url), policy).is_link(),
        _ => false,
    })
}

fn link_destination(link_type: LinkType, dest_url: &str) -> String {
    match link_type {
        LinkType::Email => format!("mailto:{dest_url}"),
        _ => dest_url.to_string(),
    }
}

// ── Rendering ───────────────────────────────────────────────────────────────

fn render_link(link: &PendingLink, policy: &SanitizePolicy) -> String {
    // The parser decodes entities, so the label is sanitized again.
    let label = sanitize_plain_text(&link.label, PlainTextOptions::default());
    let label = escape_link_syntax(&defang_bare_urls(&label, policy));
    match resolve_url(&link.dest, policy) {
        ResolvedUrl::Link(canonical) if link.autolink => format!("<{canonical}>"),
        ResolvedUrl::Link(canonical) => {
            let bang = if link.image { "!" } else { "" };
            let dest = if canonical.contains(['(', ')']) {
                format!("<{canonical}>")
            } else {
                canonical
            };
            if link.title.is_empty() {
                format!("{bang}[{label}]({dest})")
            } else {
                let title = sanitize_plain_text(&link.title, PlainTextOptions::default());
                format!("{bang}[{label}]({dest} \"{}\")", escape_title(&title))
            }
        }
        ResolvedUrl::Inert(text) => {
            let text = escape_link_syntax(&text);
            if link.autolink || label.is_empty() {
                text
            } else {
                format!("{label} ({text})")
            }
        }
    }
}

/// Backslash-escape the characters that can open a link or autolink.
fn escape_link_syntax(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']' | '<' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_title(title: &str) -> String {
    title.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Turn a reference definition into paragraph text: the opening `[` is escaped and
/// the destination's scheme colon defanged.
fn neutralize_definition(source: &str) -> String {
    let Some(open) = source.find('[') else {
        return escape_link_syntax(source);
    };
    let (indent, rest) = source.split_at(open);
    let (label, dest) = match rest.find("]:") {
        Some(end) => rest.split_at(end + 2),
        None => (rest, ""),
    };
    let trimmed = dest.trim_start();
    let spacing = &dest[..dest.len() - trimmed.len()];
    let trimmed = trimmed.strip_prefix('<').unwrap_or(trimmed);
    let dest = LEADING_SCHEME_RE.replace(trimmed, format!("${{1}}{DEFANGED_COLON}"));
    format!("{indent}\\{label}{spacing}{}", escape_link_syntax(&dest))
}

fn render_bare(raw: &str, policy: &SanitizePolicy) -> String {
    let url = raw.trim_end_matches(['.', ',', ';', ':', '!', '?', '\'', '"']);
    let tail = &raw[url.len()..];
    match resolve_url(url, policy) {
        ResolvedUrl::Link(_) => raw.to_string(),
        ResolvedUrl::Inert(text) => format!("{text}{tail}"),
    }
}

fn defang_first_colon(url: &str) -> String {
    match url.split_once(':') {
        Some((scheme, rest)) => format!("{scheme}{DEFANGED_COLON}{rest}"),
        None => url.to_string(),
    }
}

/// Inert rendering of text that failed to parse as a URL.
fn defang_inert_text(text: &str) -> String {
    let text = sanitize_plain_text(text, PlainTextOptions::default());
    let text = LEADING_SCHEME_RE.replace(&text, format!("${{1}}{DEFANGED_COLON}"));
    BARE_URL_RE
        .replace_all(&text, |caps: &Captures<'_>| defang_first_colon(&caps[0]))
        .into_owned()
}
