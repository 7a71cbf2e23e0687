pub mod params;
pub mod run;
pub mod util;
pub mod validate;
