//! Built-in notice documents

/// Message served when the gate is active but no content has been saved
pub const FALLBACK_MESSAGE: &str = "Under Construction. Please check back later.";

/// Content the settings form offers before anything is saved, and on reset
pub const DEFAULT_CONTENT: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <meta charset="UTF-8">
        <title>Under Construction</title>
        <style>
            body { font-family: Arial, sans-serif; text-align: center; padding-top: 50px; }
        </style>
    </head>
    <body>
        <h1>Site Under Construction</h1>
        <p>We are currently making improvements. Please check back soon!</p>
    </body>
</html>"#;

/// Wrap the fallback message in a minimal, complete HTML document
pub fn fallback_document() -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>Under Construction</title>\n</head>\n<body>\n<p>{}</p>\n</body>\n</html>\n",
        FALLBACK_MESSAGE
    )
}

/// Escape text for inclusion in HTML element content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
