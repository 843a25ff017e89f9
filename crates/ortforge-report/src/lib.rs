//! Report rendering for ortforge validation runs.
//!
//! - [`html`]: a self-contained HTML page (inline CSS/JS, SVG layout chart)
//! - [`sarif`]: SARIF 2.1.0 for code-scanning dashboards

pub mod html;
pub mod sarif;

pub use html::{generate_html, write_html_report};
pub use sarif::{generate_sarif, write_sarif_report};
