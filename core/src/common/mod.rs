pub mod field;
pub mod labeled;
pub mod particles;
pub mod range;

pub use field::FieldSet;
pub use labeled::{ArrayError, LabeledArray};
pub use particles::ParticleSet;
pub use range::Range;
