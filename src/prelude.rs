pub use snafu::{ensure, OptionExt, ResultExt, Snafu};
