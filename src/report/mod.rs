pub mod export;
pub mod pdf;
pub mod pivot;
pub mod raster;
