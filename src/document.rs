//! Builds the self-contained HTML document that gets printed.

use std::fmt::Write as _;

use comrak::{Options, markdown_to_html};

pub const DEFAULT_TITLE: &str = "Consultation Feedback Report";

const PRINT_STYLESHEET: &str = r#"    @page { margin: 18mm 16mm; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Arial, sans-serif;
      font-size: 11.5pt;
      line-height: 1.45;
      color: #111;
    }
    .wrap { max-width: 1280px; margin: 0 auto; }
    .header { margin-bottom: 14mm; }
    .logo { height: 18mm; width: auto; display: block; }
    h1 { font-size: 18pt; margin: 8mm 0 0; }
    h2 { font-size: 13.5pt; margin: 10mm 0 3mm; break-after: avoid; }
    h3 { font-size: 12pt; margin: 8mm 0 2mm; break-after: avoid; }
    p { margin: 3mm 0; }
    ul, ol { margin: 3mm 0 3mm 6mm; padding: 0; }
    li { margin: 1.5mm 0; }
    p, li { orphans: 3; widows: 3; }
    table { border-collapse: collapse; margin: 3mm 0; break-inside: avoid; }
    th, td { border: 1px solid #d0d0d0; padding: 1.5mm 2.5mm; text-align: left; }
    h2 { border-top: 1px solid #e5e5e5; padding-top: 4mm; }
    h2:first-of-type { border-top: none; padding-top: 0; }
"#;

/// Escapes text for use inside element content or a quoted attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

fn markdown_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.table = true;
    ext.strikethrough = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.tagfilter = false;

    let render = &mut options.render;
    render.hardbreaks = true;
    render.r#unsafe = true;

    options
}

/// GitHub-flavoured Markdown to HTML, single newlines become `<br />`.
pub fn markdown_to_body(markdown: &str) -> String {
    markdown_to_html(markdown, &markdown_options())
}

/// Wraps `body_html` in the print template. `title` and `logo_url` are
/// escaped, `body_html` is embedded as-is.
pub fn compose(title: &str, logo_url: &str, body_html: &str) -> String {
    let title = escape_html(title);

    let mut doc = String::with_capacity(body_html.len() + PRINT_STYLESHEET.len() + 512);
    doc.push_str("<!doctype html>\n<html>\n<head>\n  <meta charset=\"utf-8\" />\n");
    let _ = writeln!(doc, "  <title>{title}</title>");
    doc.push_str("  <style>\n");
    doc.push_str(PRINT_STYLESHEET);
    doc.push_str("  </style>\n</head>\n<body>\n  <div class=\"wrap\">\n    <div class=\"header\">\n");
    if !logo_url.is_empty() {
        let _ = writeln!(
            doc,
            "      <img class=\"logo\" src=\"{}\" alt=\"Logo\" />",
            escape_html(logo_url)
        );
    }
    let _ = writeln!(doc, "      <h1>{title}</h1>");
    doc.push_str("    </div>\n");
    let _ = writeln!(doc, "    <div class=\"content\">{body_html}</div>");
    doc.push_str("  </div>\n</body>\n</html>\n");
    doc
}
