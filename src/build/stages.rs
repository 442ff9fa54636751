pub mod assets;
pub mod feed;
pub mod finalize;
pub mod load;
pub mod render;
