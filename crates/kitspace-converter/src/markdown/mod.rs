//! README rendering: Markdown to sanitised HTML.
//!
//! Stages, in order:
//!
//! 1. parse with GitHub-flavoured extensions (tables, strikethrough, task
//!    lists, footnotes), raw HTML passes through
//! 2. emoji shortcodes, heading slugs with wrapping anchors, highlighted
//!    fenced code
//! 3. URL rewriting relative to the repository and heading shift
//! 4. sanitisation, always last

pub mod highlight;
pub mod sanitize;
pub mod urls;

use std::collections::HashMap;
use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, TextMergeStream};
use regex::{Captures, Regex};

use crate::error::ConversionError;

pub use urls::UrlContext;

static SHORTCODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r":([a-z0-9_+\-]+):").ok());

/// Render a README to the HTML served as `readme.html`.
pub fn render_readme(markdown: &str, ctx: &UrlContext) -> Result<String, ConversionError> {
    let html = render_html(markdown);
    let html = urls::rewrite(&html, ctx)?;
    Ok(sanitize::clean(&html))
}

fn render_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;
    let parser = TextMergeStream::new(Parser::new_ext(markdown, options));

    let mut events: Vec<Event<'_>> = Vec::new();
    let mut slugger = Slugger::default();
    let mut heading: Option<(usize, Vec<Event<'_>>)> = None;
    let mut code: Option<(Option<String>, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info.split_whitespace().next().map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                code = Some((lang, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, text)) = code.take() {
                    events.push(Event::Html(highlight::code_block(lang.as_deref(), &text).into()));
                }
            }
            Event::Text(text) if code.is_some() => {
                if let Some((_, buffer)) = code.as_mut() {
                    buffer.push_str(&text);
                }
            }
            Event::Start(Tag::Heading { level, .. }) => {
                heading = Some((level as usize, Vec::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, inner)) = heading.take() {
                    let id = slugger.slug(&plain_text(&inner));
                    events.push(Event::Html(format!("<h{level} id=\"{id}\"><a href=\"#{id}\">").into()));
                    events.extend(inner);
                    events.push(Event::Html(format!("</a></h{level}>\n").into()));
                }
            }
            Event::Text(text) => {
                let text = Event::Text(emojify(&text).into());
                match heading.as_mut() {
                    Some((_, inner)) => inner.push(text),
                    None => events.push(text),
                }
            }
            other => match heading.as_mut() {
                Some((_, inner)) => inner.push(other),
                None => events.push(other),
            },
        }
    }

    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, events.into_iter());
    html
}

fn plain_text(events: &[Event<'_>]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
            _ => None,
        })
        .collect()
}

/// Replace `:shortcode:` with the emoji, leaving unknown codes alone.
pub fn emojify(text: &str) -> String {
    let Some(re) = SHORTCODE.as_ref() else {
        return text.to_string();
    };
    re.replace_all(text, |caps: &Captures<'_>| match emojis::get_by_shortcode(&caps[1]) {
        Some(emoji) => emoji.as_str().to_string(),
        None => caps[0].to_string(),
    })
    .into_owned()
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// GitHub-style heading ids, unique within one document.
#[derive(Debug, Default)]
struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    fn slug(&mut self, text: &str) -> String {
        let base: String = text
            .to_lowercase()
            .chars()
            .filter_map(|c| match c {
                ' ' => Some('-'),
                '-' | '_' => Some(c),
                c if c.is_alphanumeric() => Some(c),
                _ => None,
            })
            .collect();

        let mut candidate = base.clone();
        while let Some(count) = self.seen.get_mut(&candidate) {
            *count += 1;
            candidate = format!("{base}-{count}");
        }
        self.seen.insert(candidate.clone(), 0);
        candidate
    }
}
