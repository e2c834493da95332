pub mod answer;
pub mod chunk;
pub mod enums;
pub mod patient;

pub use answer::*;
pub use chunk::*;
pub use enums::*;
pub use patient::*;
