pub mod recorder;
pub mod replay;
