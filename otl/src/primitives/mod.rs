//! The shared building blocks that every GSUB/GPOS subtable format is
//! assembled from: coverage, class definitions, anchors, value records,
//! mark arrays, and the GDEF collaborator.

mod anchor;
mod class_def;
mod coverage;
mod gdef;
mod mark_array;
mod value_record;

pub use anchor::{Anchor, AnchorHint};
pub use class_def::ClassDef;
pub use coverage::{CoverageSet, CoverageTable};
pub use gdef::{Gdef, GlyphClass, MarkGlyphSets};
pub use mark_array::{MarkArray, MarkRecord};
pub use value_record::{ValueFormat, ValueRecord};
