//! Syntax highlighting of fenced code blocks.

use std::sync::LazyLock;

use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use super::escape_html;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

/// Render a code block as `<pre><code>` with `hljs-` classed spans.
///
/// Unknown languages are emitted as escaped plain text.
pub fn code_block(lang: Option<&str>, code: &str) -> String {
    let lang = lang.filter(|l| {
        !l.is_empty()
            && l.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '#'))
    });

    let Some(lang) = lang else {
        return format!("<pre><code>{}</code></pre>\n", escape_html(code));
    };

    let body = highlight(lang, code).unwrap_or_else(|| escape_html(code));
    format!("<pre><code class=\"hljs language-{lang}\">{body}</code></pre>\n")
}

fn highlight(lang: &str, code: &str) -> Option<String> {
    let syntax = SYNTAXES.find_syntax_by_token(lang)?;
    let mut generator = ClassedHTMLGenerator::new_with_class_style(
        syntax,
        &SYNTAXES,
        ClassStyle::SpacedPrefixed { prefix: "hljs-" },
    );
    for line in LinesWithEndings::from(code) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .ok()?;
    }
    Some(generator.finalize())
}
