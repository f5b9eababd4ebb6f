pub mod trading;
pub mod market;
pub mod position;
pub mod candle;

pub use trading::*;
pub use market::*;
pub use position::*;
pub use candle::*;
