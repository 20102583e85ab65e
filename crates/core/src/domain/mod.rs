pub mod message;
pub mod outlet;
pub mod product;
pub mod tool;
