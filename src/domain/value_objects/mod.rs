pub mod frequency;

pub use frequency::Frequency;
