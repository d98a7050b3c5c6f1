pub mod context;
pub mod jsonl;
pub mod logging;
pub mod normalize;
pub mod run;
pub mod sessions;
pub mod staging;
