pub mod gate;
pub mod refresh;
