pub mod segmenter;
pub mod similarity;
pub mod source;
pub mod store;
