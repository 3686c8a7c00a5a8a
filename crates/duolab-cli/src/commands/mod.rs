pub mod compare;
pub mod generate;

mod util;

pub use util::format_elapsed;
