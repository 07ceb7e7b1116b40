pub mod layout;
pub mod render;
pub mod view;

pub use layout::{
    compute_layout, KeyClass, KeyGeometry, KeyboardLayout, LayoutCache, LayoutError, LayoutTuning,
};
pub use render::{paint, render_frame, DrawPrimitive, Palette, PaletteMode, RenderInput};
pub use view::PianoRollView;
