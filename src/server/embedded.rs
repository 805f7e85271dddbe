use rust_embed::RustEmbed;

/// Handlebars page templates, compiled into the binary.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/templates"]
pub struct Templates;

/// Stylesheets and scripts served under `/static/`.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/assets"]
pub struct Assets;
