//! Serialize scraped HTML as XHTML.
//!
//! EPUB content documents must be well-formed XML, which the HTML5
//! serialization of `scraper` is not (`<br>`, `<img ...>`, stray attribute
//! names). This walks the parsed tree and writes it back out with closed
//! void elements and escaped text, dropping scripting and embedded widgets.

use std::borrow::Cow;

use html_escape::{encode_double_quoted_attribute, encode_text};
use scraper::node::Node;
use scraper::ElementRef;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "iframe", "object", "embed", "form", "button", "input",
    "select", "textarea", "svg", "math", "template", "video", "audio", "source",
];

// replaced by their content
const UNWRAPPED_ELEMENTS: &[&str] = &["picture", "font", "center"];

/// Decides what image and link references become in the output.
pub trait Rewrite {
    /// New `src` for an image, or `None` to drop the `img` element.
    fn image(&self, src: &str) -> Option<String>;

    /// New `href` for a link.
    fn link(&self, href: &str) -> String {
        href.to_string()
    }
}

/// Write `element` including its own tag.
pub fn write_element<R: Rewrite>(element: ElementRef<'_>, rewrite: &R, out: &mut String) {
    let el = element.value();
    let name = el.name();
    if DROPPED_ELEMENTS.contains(&name) {
        return;
    }
    if UNWRAPPED_ELEMENTS.contains(&name) || !is_plain_name(name) {
        write_children(element, rewrite, out);
        return;
    }

    let mut attrs = Vec::new();
    for (attr, value) in el.attrs() {
        if !is_kept_attribute(name, attr) {
            continue;
        }
        let value = match (name, attr) {
            ("img", "src") => match rewrite.image(value) {
                Some(src) => src,
                None => return,
            },
            ("a", "href") => rewrite.link(value),
            _ => value.to_string(),
        };
        attrs.push((attr, value));
    }
    if name == "img" && !attrs.iter().any(|(attr, _)| *attr == "src") {
        return;
    }
    if name == "img" && !attrs.iter().any(|(attr, _)| *attr == "alt") {
        attrs.push(("alt", String::new()));
    }
    attrs.sort_by(|a, b| a.0.cmp(b.0));

    out.push('<');
    out.push_str(name);
    for (attr, value) in &attrs {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&encode_double_quoted_attribute(&xml_chars(value)));
        out.push('"');
    }

    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    write_children(element, rewrite, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Write the content of `element` without its own tag.
pub fn write_children<R: Rewrite>(element: ElementRef<'_>, rewrite: &R, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let text = xml_chars(text);
                out.push_str(&encode_text(&text));
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, rewrite, out);
                }
            }
            _ => {}
        }
    }
}

/// Drop characters XML 1.0 does not allow, such as form feeds and other
/// C0 controls besides tab and newlines.
pub fn xml_chars(text: &str) -> Cow<'_, str> {
    let allowed = |c: char| {
        matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && !matches!(c, '\u{fffe}' | '\u{ffff}'))
    };
    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

/// Element names without a namespace prefix. Prefixed tags such as Word's
/// `<o:p>` would need a namespace declaration, so only their content is kept.
fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_kept_attribute(element: &str, attr: &str) -> bool {
    let mut chars = attr.chars();
    let well_formed = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !well_formed || attr.starts_with("on") {
        return false;
    }
    // responsive variants would point back at the web
    !(element == "img" && matches!(attr, "srcset" | "sizes" | "loading" | "decoding"))
}
