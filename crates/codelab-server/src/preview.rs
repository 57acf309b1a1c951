//! Rendered-document composition for the preview pane.

/// Concatenate the markup, style, and behavior editors into a single
/// document for the rendered pane.
///
/// Deliberately has no limits, no worker isolation, and no error
/// handling: the browser's own iframe sandbox is the isolation boundary
/// for this surface.
pub fn compose_document(html: &str, css: &str, js: &str) -> String {
    format!("{}<style>{}</style><script>{}</script>", html, css, js)
}
