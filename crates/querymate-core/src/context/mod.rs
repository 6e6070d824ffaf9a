pub mod collector;
pub mod finalizer;
