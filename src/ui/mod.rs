//! HTML output for code blocks.
//!
//! The page shell embeds these fragments as-is, so everything that came
//! from sample input is escaped here or by the highlighting engine.

mod render;

pub use render::{render_block, render_page};
