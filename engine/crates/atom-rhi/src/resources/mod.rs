pub mod buffer;
pub mod clear;
pub mod image;
pub mod pipeline;
