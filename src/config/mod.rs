pub mod parser;
mod terrain_desc;
pub mod tokenizer;

pub use terrain_desc::*;
