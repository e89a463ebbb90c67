use std::fmt::Write as _;
use std::time::Instant;

use crate::app::{CodeBlock, Display, Model};
use crate::highlight::escape_code;

/// Render one code block: copy button, language badge, highlighted body.
///
/// A block whose request is still in flight shows its current code as
/// escaped plain text.
pub fn render_block(block: &CodeBlock, now: Instant) -> String {
    let language = block.language.as_str();
    let body = match block.display() {
        Display::Rendered(result) => result.to_html(),
        Display::Pending => format!("<pre><code>{}</code></pre>", escape_code(&block.code)),
    };
    let state = if block.is_pending() {
        "pending"
    } else {
        "ready"
    };

    let mut html = String::with_capacity(body.len() + 256);
    let _ = writeln!(
        html,
        "<div class=\"code-block\" data-block=\"{}\" data-language=\"{}\" data-state=\"{state}\">",
        block.id.0,
        html_escape::encode_double_quoted_attribute(language),
    );
    let _ = writeln!(
        html,
        "  <button class=\"copy-button\" type=\"button\">{}</button>",
        block.copy.label(now)
    );
    let _ = writeln!(
        html,
        "  <div class=\"language-badge\">{}</div>",
        escape_code(language)
    );
    let _ = writeln!(html, "  <div class=\"code-body\">{body}</div>");
    html.push_str("</div>\n");
    html
}

/// Render every block of the page, in order.
pub fn render_page(model: &Model, now: Instant) -> String {
    let _scope = crate::perf::scope("ui.render_page");
    let mut html = String::from("<section class=\"code-samples\">\n");
    for block in &model.blocks {
        html.push_str(&render_block(block, now));
    }
    html.push_str("</section>\n");
    html
}
