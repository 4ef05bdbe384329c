//! Server-side HTML for the upload / browse page.
//!
//! Every piece of user-controlled text (file names, extracted text, error
//! messages) goes through `html_escape`; document keys in links go through
//! `urlencoding`.

use crate::error::DocumentError;
use html_escape::{encode_double_quoted_attribute, encode_text};

pub const TITLE: &str = "IDMP Text Extraction Prototype";

const STYLE: &str = "\
body{font-family:sans-serif;margin:0;display:flex;min-height:100vh}\
aside{width:16rem;padding:1rem;background:#f0f2f6}\
main{flex:1;padding:1rem 2rem;max-width:60rem}\
.error{background:#ffe9e9;color:#7d1a1a;padding:.75rem;border-radius:.25rem;margin:.5rem 0;white-space:pre-wrap}\
.info{background:#e8f0fe;padding:.75rem;border-radius:.25rem;margin:.5rem 0}\
figure{margin:0}img{max-width:100%}figcaption{color:#666;font-size:.9rem}\
pre{white-space:pre-wrap;word-wrap:break-word}";

/// The word cloud area for the selected document.
#[derive(Debug, Clone, PartialEq)]
pub enum WordCloudView {
    /// Base64-encoded PNG.
    Png(String),
    /// Nothing to draw; the message explains why.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedDocument<'a> {
    pub key: &'a str,
    pub text: &'a str,
    pub wordcloud: WordCloudView,
}

/// Everything the main page shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexView<'a> {
    pub keys: Vec<&'a str>,
    pub failures: &'a [DocumentError],
    pub selected: Option<SelectedDocument<'a>>,
    /// Upload count of the last batch, `None` before the first upload.
    pub last_batch: Option<usize>,
}

pub fn index_page(view: &IndexView<'_>) -> String {
    let mut body = String::new();
    body.push_str(&upload_form());

    if let Some(total) = view.last_batch {
        body.push_str(&format!(
            "<p class=\"info\">Analyzed {} of {} document(s).</p>",
            view.keys.len(),
            total
        ));
    }

    for failure in view.failures {
        body.push_str(&error_block(&failure.to_string()));
    }

    if let Some(ref doc) = view.selected {
        let key = encode_text(doc.key);
        body.push_str(&format!(
            "<h2>Word Cloud for Selected Document (Name: {key})</h2>"
        ));
        match doc.wordcloud {
            WordCloudView::Png(ref b64) => body.push_str(&format!(
                "<figure><img src=\"data:image/png;base64,{b64}\" alt=\"Word cloud\">\
<figcaption>Word Cloud for {key}</figcaption></figure>"
            )),
            WordCloudView::Unavailable(ref msg) => {
                body.push_str(&format!("<p class=\"info\">{}</p>", encode_text(msg)))
            }
        }
        body.push_str(&format!(
            "<h2>Extracted Text for Selected Document (Name: {key})</h2><pre>{}</pre>",
            encode_text(doc.text)
        ));
    }

    let selected_key = view.selected.as_ref().map(|d| d.key);
    layout(&sidebar(&view.keys, selected_key), &body)
}

/// The page shown when endpoint or key is missing: one message, no pipeline output.
pub fn config_error_page(message: &str) -> String {
    layout("", &format!("{}{}", upload_form(), error_block(message)))
}

pub fn error_page(message: &str) -> String {
    layout(
        "",
        &format!("{}<p><a href=\"/\">Back</a></p>", error_block(message)),
    )
}

fn layout(sidebar: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{TITLE}</title><style>{STYLE}</style></head>\
<body><aside>{sidebar}</aside><main><h1>{TITLE}</h1>{body}</main></body></html>"
    )
}

fn upload_form() -> String {
    "<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
<label for=\"files\">Upload PDF Documents</label><br>\
<input type=\"file\" id=\"files\" name=\"files\" accept=\".pdf,application/pdf\" multiple>\
<button type=\"submit\">Upload</button></form>"
        .to_string()
}

fn sidebar(keys: &[&str], selected: Option<&str>) -> String {
    if keys.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "<form method=\"get\" action=\"/\"><fieldset><legend>Select a Document</legend>",
    );
    for key in keys {
        let checked = if Some(*key) == selected { " checked" } else { "" };
        out.push_str(&format!(
            "<label><input type=\"radio\" name=\"doc\" value=\"{}\"{checked} \
onchange=\"this.form.submit()\"> {}</label><br>",
            encode_double_quoted_attribute(key),
            encode_text(key)
        ));
    }
    out.push_str("</fieldset><noscript><button type=\"submit\">Show</button></noscript></form>");

    out.push_str("<p>Downloads:</p><ul>");
    if let Some(key) = selected {
        let q = urlencoding::encode(key);
        out.push_str(&format!(
            "<li><a href=\"/documents/wordcloud.png?doc={q}\">Word cloud (PNG)</a></li>\
<li><a href=\"/documents/text?doc={q}\">Text</a></li>\
<li><a href=\"/documents/analysis?doc={q}\">Layout (JSON)</a></li>"
        ));
    }
    out.push_str("</ul>");
    out
}

fn error_block(message: &str) -> String {
    format!("<div class=\"error\">{}</div>", encode_text(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_escapes_text_and_keys() {
        let view = IndexView {
            keys: vec!["<a>.pdf"],
            selected: Some(SelectedDocument {
                key: "<a>.pdf",
                text: "1 < 2 & 3",
                wordcloud: WordCloudView::Png("AAAA".into()),
            }),
            ..Default::default()
        };
        let html = index_page(&view);
        assert!(html.contains("1 &lt; 2 &amp; 3"));
        assert!(html.contains("Word Cloud for Selected Document (Name: &lt;a&gt;.pdf)"));
        assert!(html.contains("doc=%3Ca%3E.pdf"));
        assert!(!html.contains("(Name: <a>"));
    }

    #[test]
    fn index_marks_selected_radio() {
        let view = IndexView {
            keys: vec!["a.pdf", "b.pdf"],
            selected: Some(SelectedDocument {
                key: "b.pdf",
                text: "",
                wordcloud: WordCloudView::Unavailable("No words".into()),
            }),
            ..Default::default()
        };
        let html = index_page(&view);
        assert!(html.contains("value=\"b.pdf\" checked"));
        assert!(!html.contains("value=\"a.pdf\" checked"));
        assert!(html.contains("No words"));
    }

    #[test]
    fn config_error_page_has_only_the_message() {
        let html = config_error_page("configuration is missing");
        assert!(html.contains("configuration is missing"));
        assert!(!html.contains("Select a Document"));
        assert!(!html.contains("Word Cloud"));
    }
}
