use postkeep_core::metrics::{RawMetric, normalize};

pub fn run(value: &str) {
    println!("{}", normalize(Some(&RawMetric::from(value))));
}
