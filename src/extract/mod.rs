pub mod classifier;
pub mod description;
pub mod detail;
pub mod price;
pub mod text;

pub use classifier::classify_subtype;
pub use detail::DetailParser;
