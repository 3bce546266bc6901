pub mod blob;
pub mod composite;
pub mod contour;
pub mod equalize;
pub mod morphology;
pub mod scaling;
pub mod strip;
pub mod threshold;

pub use blob::{component_stats, edge_contacts, extract_blob, select_main_blob};
pub use composite::{compose, orient, place_image, Background, CanvasSpec, Flip, OversizePolicy};
pub use contour::{Accumulation, ContourAccumulator};
pub use equalize::{clahe, equalize};
pub use morphology::close;
pub use scaling::{apply_mask, scale_and_mask};
pub use strip::{find_strip, remove_strip, zero_strip};
pub use threshold::{binarize, find_threshold, Threshold};
