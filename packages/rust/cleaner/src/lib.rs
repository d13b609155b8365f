//! HTML-to-text cleaning.
//!
//! Turns a raw page into a single line of visible text suitable for an LLM
//! prompt: script and style subtrees are dropped, the remaining text is split
//! into lines and double-space-separated fragments, each fragment is trimmed,
//! and the non-empty ones are joined with single spaces.

use scraper::Html;
use scraper::node::Node;

/// Elements whose text is never visible.
const HIDDEN_ELEMENTS: [&str; 2] = ["script", "style"];

/// Fragment separator inside a line.
const FRAGMENT_SEPARATOR: &str = "  ";

/// Convert raw HTML into cleaned plain text. Empty input yields empty output.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let raw = visible_text(html);

    raw.split(is_line_break)
        .map(str::trim)
        .flat_map(|line| line.split(FRAGMENT_SEPARATOR))
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Concatenate every text node outside script/style subtrees, in document order.
fn visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);

    for node in doc.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
            Node::Element(el) => HIDDEN_ELEMENTS.contains(&el.name()),
            _ => false,
        });
        if !hidden {
            let text: &str = text;
            out.push_str(text);
        }
    }

    out
}

/// Line boundaries recognized when splitting extracted text.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0b}'
            | '\u{0c}'
            | '\u{1c}'
            | '\u{1d}'
            | '\u{1e}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_collapses_double_spaces() {
        assert_eq!(
            html_to_text("<script>x</script><p>Hello  world</p>"),
            "Hello world"
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(html_to_text(""), "");
        assert_eq!(html_to_text("   \n"), "");
    }

    #[test]
    fn strips_style_and_nested_script() {
        let html = r#"<html><head><style>body { color: red }</style></head>
            <body><div><script type="text/javascript">var a = 1;</script>
            <h1>Acme</h1><p>We make anvils.</p></div></body></html>"#;
        assert_eq!(html_to_text(html), "Acme We make anvils.");
    }

    #[test]
    fn lines_are_trimmed_and_blank_lines_dropped() {
        let html = "<pre>  first line  \n\n\n   second    line\r\nthird</pre>";
        assert_eq!(html_to_text(html), "first line second line third");
    }

    #[test]
    fn single_spaces_inside_fragments_are_kept() {
        assert_eq!(
            html_to_text("<p>one two three</p>"),
            "one two three"
        );
    }

    #[test]
    fn adjacent_inline_text_is_concatenated() {
        assert_eq!(html_to_text("<p><b>Con</b>tact us</p>"), "Contact us");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(html_to_text("<p>Tom &amp; Jerry</p>"), "Tom & Jerry");
    }

    #[test]
    fn comments_are_ignored() {
        assert_eq!(html_to_text("<p>a<!-- hidden -->b</p>"), "ab");
    }

    #[test]
    fn is_deterministic() {
        let html = "<div>Alpha  Beta\nGamma</div>";
        assert_eq!(html_to_text(html), html_to_text(html));
        assert_eq!(html_to_text(html), "Alpha Beta Gamma");
    }
}
