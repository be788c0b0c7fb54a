//! Final HTML sanitisation with an explicit allow-list.

use std::borrow::Cow;
use std::collections::HashSet;

const URL_SCHEMES: [&str; 9] = [
    "http", "https", "ftp", "ftps", "ssh", "mailto", "tel", "sms", "magnet",
];

const HEADINGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Strip everything outside the allow-list.
///
/// On top of the default policy: `loading` and `data-*` on images, `class`
/// on `span` and `code`, `id` on headings, `target` on links and disabled
/// task-list checkboxes.
pub fn clean(html: &str) -> String {
    let mut builder = ammonia::Builder::default();
    builder
        .add_tags(["input"])
        .add_tag_attributes("input", ["type", "checked", "disabled"])
        .add_tag_attributes("img", ["loading"])
        .generic_attribute_prefixes(HashSet::from(["data-"]))
        .attribute_filter(|element, attribute, value| {
            if attribute.starts_with("data-") && element != "img" {
                None
            } else {
                Some(Cow::Borrowed(value))
            }
        })
        .add_tag_attributes("span", ["class"])
        .add_tag_attributes("code", ["class"])
        .add_tag_attributes("a", ["target"])
        .url_schemes(URL_SCHEMES.into_iter().collect::<HashSet<_>>());
    for heading in HEADINGS {
        builder.add_tag_attributes(heading, ["id"]);
    }
    builder.clean(html).to_string()
}
